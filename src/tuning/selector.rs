use std::collections::BTreeSet;

use log::debug;

use crate::config::TunerConfig;

use super::choice::{ChoiceId, IndexChoice, TuningOperation};

/*
    Budgeted greedy swap over the scored choices:
    1. Sort ascending by saved work. `worst` walks from the front, `best`
       from the back.
    2. If dropping the worst choice beats creating the best one, drop it.
    3. Otherwise try to install the best choice, sacrificing existing
       indexes from the worst end until enough budget is free -- but only
       if their combined saved work does not exceed the newcomer's.
    Within one swap the drops are emitted before the create, so the budget
    is never exceeded by more than the index being installed.
*/

pub struct GreedySelector {
    confidence_tiebreak: bool,
    max_new_indexes: Option<u32>,
}

impl GreedySelector {
    pub fn new() -> GreedySelector {
        GreedySelector { confidence_tiebreak: true, max_new_indexes: None }
    }

    pub fn from_config(config: &TunerConfig) -> GreedySelector {
        GreedySelector {
            confidence_tiebreak: config.confidence_tiebreak,
            max_new_indexes: config.max_new_indexes_per_pass,
        }
    }

    pub fn select(&self, choices: &[IndexChoice], memory_budget: f32) -> Vec<TuningOperation> {
        let mut operations = Vec::new();
        if choices.is_empty() {
            return operations;
        }

        // Ascending saved work; among ties the less confident choice sorts
        // towards the worst end. The sort is stable, so choices that tie on
        // every key keep their input order.
        let mut order: Vec<ChoiceId> = (0..choices.len()).collect();
        order.sort_by(|&a, &b| {
            let by_work = choices[a].saved_work.total_cmp(&choices[b].saved_work);
            if self.confidence_tiebreak {
                by_work.then(choices[a].confidence.total_cmp(&choices[b].confidence))
            } else {
                by_work
            }
        });

        let mut memory_in_use: f32 =
            choices.iter().filter(|c| c.exists).map(|c| c.memory_cost).sum();

        let mut suppressed: BTreeSet<ChoiceId> = BTreeSet::new();
        let mut creates_emitted: u32 = 0;

        let mut worst: usize = 0;
        let mut best: isize = order.len() as isize - 1;

        while best >= worst as isize {
            let worst_choice = &choices[order[worst]];
            let best_choice = &choices[order[best as usize]];
            if worst_choice.saved_work < 0.0 && -worst_choice.saved_work > best_choice.saved_work {
                // Removing the worst index is worth more than creating the best
                if let Some(operation) = worst_choice.reject() {
                    debug!("planned operation: {} ({})", operation, worst_choice);
                    memory_in_use -= worst_choice.memory_cost;
                    operations.push(operation);
                }
                worst += 1;
            } else {
                if !best_choice.exists
                    && !suppressed.contains(&order[best as usize])
                    && self.max_new_indexes.map(|max| creates_emitted < max).unwrap_or(true)
                {
                    // Minimum saved work that must be sacrificed to free
                    // enough memory for the new index
                    let required = best_choice.memory_cost + memory_in_use - memory_budget;
                    let mut sacrificed_saved_work = 0.0f32;
                    let mut obtained_memory = 0.0f32;
                    let mut sacrifice = worst;
                    while obtained_memory < required && sacrifice != best as usize {
                        let candidate = &choices[order[sacrifice]];
                        if candidate.exists {
                            sacrificed_saved_work += candidate.saved_work;
                            obtained_memory += candidate.memory_cost;
                        }
                        sacrifice += 1;
                    }
                    if obtained_memory >= required && sacrificed_saved_work <= best_choice.saved_work
                    {
                        // Drop the sacrificed indexes first, then create the
                        // better one
                        for dropped in worst..sacrifice {
                            let candidate = &choices[order[dropped]];
                            if let Some(operation) = candidate.reject() {
                                debug!("planned operation: {} ({})", operation, candidate);
                                memory_in_use -= candidate.memory_cost;
                                operations.push(operation);
                            }
                        }
                        worst = sacrifice;
                        if let Some(operation) = best_choice.accept() {
                            debug!("planned operation: {} ({})", operation, best_choice);
                            memory_in_use += best_choice.memory_cost;
                            creates_emitted += 1;
                            suppressed.extend(best_choice.invalidates.iter().copied());
                            operations.push(operation);
                        }
                    }
                }
                best -= 1;
            }
        }

        operations
    }
}
