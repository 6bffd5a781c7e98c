use std::sync::Arc;

use crate::cache::{CachedPlan, GdfsPlanCache};
use crate::catalog::{AttributeDesc, Catalog};
use crate::config::DbConfig;
use crate::execution::plan::{PhysicalOperatorKind, PhysicalPlan, ScanParameter};
use crate::tuning::Tuner;
use crate::types::{PredicateOp, TupleValue, TupleValueType};

mod cache;
mod catalog;
mod config;
mod execution;
mod planner;
mod statistics;
mod storage;
mod tuning;
mod types;

fn main() {
    env_logger::init();
    println!("ChertDB - self-tuning columnar SQL database");

    // Small demonstration of the index tuning loop: a table, a hot cached
    // query, one tuning pass.
    let db_config = DbConfig::new();
    let catalog = Catalog::new();
    catalog
        .create_table(
            "orders",
            vec![
                AttributeDesc {
                    id: 0,
                    name: "id".to_string(),
                    data_type: TupleValueType::Int,
                    nullable: false,
                },
                AttributeDesc {
                    id: 1,
                    name: "customer_id".to_string(),
                    data_type: TupleValueType::Int,
                    nullable: false,
                },
            ],
            db_config.chunk_capacity,
        )
        .unwrap();
    let orders = catalog.table("orders").unwrap();
    for i in 0..100_000 {
        orders.append_row(vec![
            Some(TupleValue::Int(i)),
            Some(TupleValue::Int(i % 1_000)),
        ]);
    }

    let cache = Arc::new(GdfsPlanCache::new(1024));
    let mut plan = PhysicalPlan::new();
    let get_table = plan.add_operator(
        PhysicalOperatorKind::GetTable { table_name: "orders".to_string() }, None, None);
    let scan = plan.add_operator(
        PhysicalOperatorKind::TableScan {
            left_column_id: 1,
            predicate_op: PredicateOp::Equals,
            right_parameter: ScanParameter::Literal(TupleValue::Int(42)),
        },
        Some(get_table),
        None,
    );
    plan.set_root(scan);
    let cached = CachedPlan::Physical(Arc::new(plan));
    for _ in 0..25 {
        cache.put("select * from orders where customer_id = 42", cached.clone());
    }

    let mut tuner = Tuner::new(cache, catalog.clone(), db_config.tuner);
    match tuner.execute() {
        Ok(report) => {
            println!(
                "tuning pass: {} access records, {} candidates, {} creates, {} drops, index memory {:.3} MiB",
                report.access_records,
                report.candidates,
                report.creates,
                report.drops,
                report.memory_after_mib
            );
            for applied in &report.operations {
                println!(
                    "  {} (predicted saved work: {:.0} row scans)",
                    applied.operation, applied.predicted_saved_work
                );
            }
        }
        Err(e) => eprintln!("tuning pass failed: {}", e),
    }
}
