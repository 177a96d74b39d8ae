use std::collections::BTreeSet;

use crate::s3::{BucketSummary, ObjectSummary, PermissionReport};
use crate::worker::{EventPayload, LogLevel, Operation, OperationKind, WorkerEvent};

use super::command::Selection;
use super::logbook::LogBook;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Buckets,
    Files,
    Logs,
}

#[derive(Debug)]
pub struct ShellState {
    pub view: View,
    pub buckets: Vec<BucketSummary>,
    pub bucket: Option<String>,
    pub objects: Vec<ObjectSummary>,
    pub selected: BTreeSet<usize>,
    pub last_report: Option<PermissionReport>,
    pub progress: Option<(OperationKind, u8)>,
    pub logs: LogBook,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            view: View::Buckets,
            buckets: Vec::new(),
            bucket: None,
            objects: Vec::new(),
            selected: BTreeSet::new(),
            last_report: None,
            progress: None,
            logs: LogBook::default(),
        }
    }
}

impl ShellState {
    pub fn resolve_bucket(&self, name_or_number: &str) -> Option<String> {
        if let Ok(number) = name_or_number.parse::<usize>() {
            if let Some(bucket) = number.checked_sub(1).and_then(|i| self.buckets.get(i)) {
                return Some(bucket.name.clone());
            }
        }
        self.buckets
            .iter()
            .find(|bucket| bucket.name == name_or_number)
            .map(|bucket| bucket.name.clone())
            .or_else(|| self.buckets.is_empty().then(|| name_or_number.to_string()))
    }

    pub fn open_bucket(&mut self, bucket: String) {
        if self.bucket.as_deref() != Some(bucket.as_str()) {
            self.objects.clear();
            self.selected.clear();
            self.last_report = None;
        }
        self.bucket = Some(bucket);
        self.view = View::Files;
    }

    pub fn select(&mut self, selection: Selection) {
        self.selected = match selection {
            Selection::All => (0..self.objects.len()).collect(),
            Selection::None => BTreeSet::new(),
            Selection::Indices(indices) => indices
                .into_iter()
                .filter(|index| *index < self.objects.len())
                .collect(),
        };
    }

    pub fn selected_keys(&self) -> Vec<String> {
        self.selected
            .iter()
            .filter_map(|index| self.objects.get(*index))
            .map(|object| object.key.clone())
            .collect()
    }

    /// Applies one worker event and returns the operation to run next, if the
    /// event makes a view stale.
    pub fn apply(&mut self, event: &WorkerEvent) -> Option<Operation> {
        match &event.payload {
            EventPayload::Progress { percent, .. } => {
                self.progress = Some((event.kind, *percent));
                None
            }
            EventPayload::Log { level, message } => {
                self.logs.push(*level, message.clone());
                None
            }
            EventPayload::BucketsListed { buckets } => {
                self.buckets = buckets.clone();
                if let Some(current) = &self.bucket {
                    if !self.buckets.iter().any(|bucket| &bucket.name == current) {
                        self.bucket = None;
                        self.objects.clear();
                        self.selected.clear();
                        self.view = View::Buckets;
                    }
                }
                None
            }
            EventPayload::ObjectsListed { bucket, objects } => {
                if self.bucket.as_deref() == Some(bucket.as_str()) {
                    self.objects = objects.clone();
                    self.selected.clear();
                }
                None
            }
            EventPayload::PermissionsChecked { report } => {
                self.last_report = Some(report.clone());
                None
            }
            EventPayload::Completed {
                success, message, ..
            } => {
                self.progress = None;
                let level = if *success { LogLevel::Info } else { LogLevel::Error };
                self.logs.push(level, format!("{}: {message}", event.kind));
                if !*success {
                    return None;
                }
                match event.kind {
                    OperationKind::DeleteFiles => self
                        .bucket
                        .clone()
                        .map(|bucket| Operation::ListObjects { bucket }),
                    OperationKind::CreateBucket | OperationKind::DeleteBucket => {
                        Some(Operation::ListBuckets)
                    }
                    _ => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use uuid::Uuid;

    fn event(kind: OperationKind, payload: EventPayload) -> WorkerEvent {
        WorkerEvent {
            operation_id: Uuid::nil(),
            kind,
            payload,
        }
    }

    fn completed(kind: OperationKind, success: bool) -> WorkerEvent {
        event(
            kind,
            EventPayload::Completed {
                success,
                message: "done".into(),
                error: (!success).then_some(ErrorKind::Client),
            },
        )
    }

    fn object(key: &str) -> ObjectSummary {
        ObjectSummary {
            key: key.into(),
            size: 1,
            last_modified: None,
        }
    }

    #[test]
    fn successful_deletes_refresh_the_open_bucket() {
        let mut state = ShellState::default();
        state.open_bucket("media".into());
        assert_eq!(
            state.apply(&completed(OperationKind::DeleteFiles, true)),
            Some(Operation::ListObjects {
                bucket: "media".into()
            })
        );
        assert_eq!(state.apply(&completed(OperationKind::DeleteFiles, false)), None);
        assert_eq!(
            state.apply(&completed(OperationKind::CreateBucket, true)),
            Some(Operation::ListBuckets)
        );
        assert_eq!(state.apply(&completed(OperationKind::ListBuckets, true)), None);
        assert_eq!(state.logs.len(), 4);
    }

    #[test]
    fn listings_only_apply_to_the_open_bucket() {
        let mut state = ShellState::default();
        state.open_bucket("media".into());
        state.apply(&event(
            OperationKind::ListFiles,
            EventPayload::ObjectsListed {
                bucket: "other".into(),
                objects: vec![object("x")],
            },
        ));
        assert!(state.objects.is_empty());

        state.apply(&event(
            OperationKind::ListFiles,
            EventPayload::ObjectsListed {
                bucket: "media".into(),
                objects: vec![object("a"), object("b"), object("c")],
            },
        ));
        state.select(Selection::Indices([0, 2, 9].into_iter().collect()));
        assert_eq!(state.selected_keys(), vec!["a".to_string(), "c".to_string()]);
        state.select(Selection::All);
        assert_eq!(state.selected.len(), 3);
    }

    #[test]
    fn deleted_bucket_closes_the_files_view() {
        let mut state = ShellState::default();
        state.open_bucket("gone".into());
        state.apply(&event(
            OperationKind::ListBuckets,
            EventPayload::BucketsListed {
                buckets: vec![BucketSummary {
                    name: "kept".into(),
                    created_at: None,
                }],
            },
        ));
        assert_eq!(state.bucket, None);
        assert_eq!(state.view, View::Buckets);
        assert_eq!(state.resolve_bucket("1"), Some("kept".into()));
        assert_eq!(state.resolve_bucket("missing"), None);
    }
}
