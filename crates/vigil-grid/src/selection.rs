use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vigil_core::{Record, RecordId};

/// Which rows the user has ticked.
///
/// `All` is symbolic: it means every record matching the current filters,
/// minus the ones unticked afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection {
    #[default]
    None,
    All {
        except: BTreeSet<RecordId>,
    },
    Ids(BTreeSet<RecordId>),
}

impl Selection {
    pub fn mode(&self) -> &'static str {
        match self {
            Selection::None => "none",
            Selection::All { .. } => "all",
            Selection::Ids(_) => "ids",
        }
    }

    /// Flip one record. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: RecordId) -> bool {
        match self {
            Selection::None => {
                *self = Selection::Ids(BTreeSet::from([id]));
                true
            }
            Selection::Ids(ids) => {
                if ids.remove(&id) {
                    if ids.is_empty() {
                        *self = Selection::None;
                    }
                    false
                } else {
                    ids.insert(id);
                    true
                }
            }
            Selection::All { except } => {
                if except.remove(&id) {
                    true
                } else {
                    except.insert(id);
                    false
                }
            }
        }
    }

    pub fn select_all(&mut self) {
        *self = Selection::All {
            except: BTreeSet::new(),
        };
    }

    pub fn clear(&mut self) {
        *self = Selection::None;
    }

    pub fn is_selected(&self, id: &RecordId) -> bool {
        match self {
            Selection::None => false,
            Selection::All { except } => !except.contains(id),
            Selection::Ids(ids) => ids.contains(id),
        }
    }

    /// Whether an export covers a hand-picked subset rather than everything
    /// that matches. An empty selection exports everything.
    pub fn selected_only(&self) -> bool {
        match self {
            Selection::None => false,
            Selection::All { except } => !except.is_empty(),
            Selection::Ids(_) => true,
        }
    }

    /// Narrow `matched` to the selection, keeping order. An empty selection
    /// keeps everything.
    pub fn apply<'r>(&self, matched: Vec<&'r Record>) -> Vec<&'r Record> {
        match self {
            Selection::None => matched,
            _ => matched
                .into_iter()
                .filter(|r| self.is_selected(&r.record_id))
                .collect(),
        }
    }
}
