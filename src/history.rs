use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{XtalStatus, parse_timestamp};
use crate::metadata::{CrystalMap, InputMetadata};
use crate::report::StageReport;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOutcome {
    pub all_xtals: CrystalMap,
    pub new_xtals: CrystalMap,
    #[serde(skip)]
    pub report: StageReport,
}

pub struct HistoryMerger<'a> {
    deprecations: &'a BTreeMap<String, String>,
}

impl<'a> HistoryMerger<'a> {
    pub fn new(deprecations: &'a BTreeMap<String, String>) -> Self {
        Self { deprecations }
    }

    pub fn merge(&self, history: &[InputMetadata], current: &mut CrystalMap) -> MergeOutcome {
        let mut report = StageReport::new();
        let mut all_xtals = CrystalMap::new();
        info!("{} deprecations were defined", self.deprecations.len());

        for (index, meta) in history.iter().enumerate() {
            for (tag, record) in &meta.crystals {
                all_xtals.insert(tag.clone(), record.clone());
            }
            debug!("metadata {} has {} items", index + 1, meta.crystals.len());
        }

        for (tag, record) in current.iter_mut() {
            let status = match all_xtals.get(tag) {
                None => XtalStatus::New,
                Some(previous) => {
                    let old = previous.last_updated.as_deref().and_then(parse_timestamp);
                    let new = record.last_updated.as_deref().and_then(parse_timestamp);
                    match (old, new) {
                        (Some(old), Some(new)) => match new.cmp(&old) {
                            Ordering::Greater => XtalStatus::Supersedes,
                            Ordering::Less | Ordering::Equal => XtalStatus::Unchanged,
                        },
                        _ => {
                            report.warn(format!(
                                "dates not defined for {tag} ({:?} vs {:?}), must assume crystal is updated",
                                previous.last_updated, record.last_updated
                            ));
                            XtalStatus::Supersedes
                        }
                    }
                }
            };
            debug!("crystal {tag} is {status}");
            record.status = Some(status);
            record.reason = None;
            all_xtals.insert(tag.clone(), record.clone());
        }

        for (tag, reason) in self.deprecations {
            let Some(record) = all_xtals.get_mut(tag) else {
                report.warn(format!("deprecated crystal {tag} is not part of any upload"));
                continue;
            };
            info!("deprecating crystal {tag}");
            record.status = Some(XtalStatus::Deprecated);
            record.reason = Some(reason.clone());
            if let Some(current_record) = current.get_mut(tag) {
                current_record.status = Some(XtalStatus::Deprecated);
                current_record.reason = Some(reason.clone());
            }
        }

        let new_xtals: CrystalMap = current
            .iter()
            .filter(|(_, record)| record.status.is_some_and(XtalStatus::needs_alignment))
            .map(|(tag, record)| (tag.clone(), record.clone()))
            .collect();

        info!(
            "merging resulted in {} total crystals, {} are new or updated",
            all_xtals.len(),
            new_xtals.len()
        );

        MergeOutcome {
            all_xtals,
            new_xtals,
            report,
        }
    }
}
