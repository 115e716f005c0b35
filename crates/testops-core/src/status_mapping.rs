use std::collections::BTreeMap;
use testops_proto::Status;
use tracing::{debug, error};

fn valid_statuses() -> String {
    Status::MAPPABLE.map(Status::as_str).join(", ")
}

/// Exact-match status substitution applied before results reach a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMapping {
    mapping: BTreeMap<Status, Status>,
}

impl StatusMapping {
    /// Builds a mapping from raw `source -> target` names, dropping invalid
    /// or redundant entries with an error log.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut mapping = BTreeMap::new();
        for (source, target) in pairs {
            let (source, target) = (source.as_ref(), target.as_ref());

            let Some(from) = source.parse::<Status>().ok().filter(|s| s.is_mappable()) else {
                error!(
                    "Invalid source status '{}' in mapping. Valid statuses: {}",
                    source,
                    valid_statuses()
                );
                continue;
            };
            let Some(to) = target.parse::<Status>().ok().filter(|s| s.is_mappable()) else {
                error!(
                    "Invalid target status '{}' in mapping. Valid statuses: {}",
                    target,
                    valid_statuses()
                );
                continue;
            };
            if from == to {
                error!(
                    "Redundant mapping: '{}' => '{}'. Source and target are the same.",
                    source, target
                );
                continue;
            }

            mapping.insert(from, to);
        }
        Self { mapping }
    }

    /// Parses `source=target` pairs separated by commas.
    pub fn parse(value: &str) -> Self {
        let pairs = value
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| match pair.split_once('=') {
                Some((source, target)) => Some((source.trim(), target.trim())),
                None => {
                    error!(
                        "Invalid status mapping pair format: '{}'. Expected format: 'source=target'",
                        pair
                    );
                    None
                }
            });
        Self::from_pairs(pairs)
    }

    pub fn map(&self, status: Status) -> Status {
        match self.mapping.get(&status) {
            Some(&mapped) => {
                debug!("Status mapping applied: '{}' -> '{}'", status, mapped);
                mapped
            }
            None => status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }
}
