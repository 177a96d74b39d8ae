use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::s3::{BucketSummary, ObjectSummary};
use crate::worker::{EventPayload, WorkerEvent};

fn format_date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn bucket_table(buckets: &[BucketSummary], selected: Option<&str>) -> String {
    if buckets.is_empty() {
        return "No buckets found".to_string();
    }
    let width = buckets.iter().map(|b| b.name.len()).max().unwrap_or(0).max(4);
    let mut out = format!("     {:<width$}  Created\n", "Name");
    for (index, bucket) in buckets.iter().enumerate() {
        let marker = if selected == Some(bucket.name.as_str()) { '*' } else { ' ' };
        out.push_str(&format!(
            "{marker}{:>3} {:<width$}  {}\n",
            index + 1,
            bucket.name,
            format_date(bucket.created_at)
        ));
    }
    out.pop();
    out
}

pub fn object_table(objects: &[ObjectSummary], selected: &BTreeSet<usize>) -> String {
    if objects.is_empty() {
        return "Bucket is empty".to_string();
    }
    let width = objects.iter().map(|o| o.key.len()).max().unwrap_or(0).max(3).min(60);
    let mut out = format!("       {:<width$}  {:>10}  Modified\n", "Key", "Size (MB)");
    for (index, object) in objects.iter().enumerate() {
        let marker = if selected.contains(&index) { "[x]" } else { "[ ]" };
        out.push_str(&format!(
            "{marker}{:>4} {:<width$}  {:>10.2}  {}\n",
            index + 1,
            object.key,
            object.size_mb(),
            format_date(object.last_modified)
        ));
    }
    out.pop();
    out
}

/// One-line rendering of an event for the terminal. List results are shown
/// through their own views, so they render as a short summary.
pub fn event_line(event: &WorkerEvent) -> String {
    match &event.payload {
        EventPayload::Progress { percent, message } => format!("[{percent:>3}%] {message}"),
        EventPayload::Log { level, message } => format!("[{level}] {message}"),
        EventPayload::BucketsListed { buckets } => format!("{} bucket(s) loaded", buckets.len()),
        EventPayload::ObjectsListed { bucket, objects } => {
            format!("{} object(s) loaded from '{bucket}'", objects.len())
        }
        EventPayload::PermissionsChecked { report } => {
            format!("Permission check finished for '{}'", report.bucket)
        }
        EventPayload::Completed {
            success: true,
            message,
            ..
        } => message.clone(),
        EventPayload::Completed {
            success: false,
            message,
            ..
        } => format!("{} failed: {message}", event.kind),
    }
}
