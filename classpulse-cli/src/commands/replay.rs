//! `classpulse replay`: push recorded envelopes through the ingestion pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use classpulse_core::{ClassroomReport, ClassroomSignals, SessionManager};
use classpulse_ingest::consumer::drain;
use classpulse_ingest::{BatchDispatcher, BatchReport, ConsumerConfig};
use classpulse_queue::{EventLog, QueueMessage, TopicRegistry};
use tracing::info;

use super::Backend;
use super::signals::print_report;
use crate::config::ClasspulseConfig;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File with one wire envelope per line
    pub file: PathBuf,

    /// Topic to publish to (defaults to the first configured topic)
    #[arg(long)]
    pub topic: Option<String>,

    /// Scan this classroom for signals once the file is ingested
    #[arg(long)]
    pub classroom: Option<u64>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Read queue messages from a JSON-lines file. Blank lines are skipped.
pub fn read_messages(path: &Path, topic: &str) -> Result<Vec<QueueMessage>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| QueueMessage::new(topic, line.as_bytes().to_vec()))
        .collect())
}

/// Publish `messages` to `topic` and consume them to the end.
pub async fn ingest(
    config: &ClasspulseConfig,
    backend: &Backend,
    topic: &str,
    messages: Vec<QueueMessage>,
) -> Result<Vec<BatchReport>> {
    let registry = TopicRegistry::new([topic]);
    let log = registry.log(topic)?;
    log.append_batch(messages).await?;

    let sessions = Arc::new(SessionManager::with_config(
        backend.store.clone(),
        backend.ttl.clone(),
        config.session.clone(),
    ));
    let dispatcher = Arc::new(BatchDispatcher::with_sessions(
        backend.store.clone(),
        sessions,
        config.dispatcher.clone(),
    ));
    let consumer = ConsumerConfig::from_queue(&config.queue)
        .with_poll_timeout(std::time::Duration::from_millis(10));

    Ok(drain(log.as_ref(), &consumer, &dispatcher.handler()).await?)
}

pub async fn run(args: ReplayArgs, config: ClasspulseConfig) -> Result<()> {
    let topic = match args.topic {
        Some(topic) => topic,
        None => config
            .queue
            .topics
            .first()
            .cloned()
            .context("No topics configured in [queue]")?,
    };
    let messages = read_messages(&args.file, &topic)?;
    info!(count = messages.len(), topic = %topic, "Replaying recorded envelopes");

    let backend = Backend::open(&config.storage).await?;
    let reports = ingest(&config, &backend, &topic, messages).await?;

    let scan: Option<ClassroomReport> = match args.classroom {
        Some(classroom_id) => {
            let signals = ClassroomSignals::new(backend.store.clone(), backend.guard(&config));
            Some(signals.scan(classroom_id).await?)
        }
        None => None,
    };

    if args.json {
        let output = serde_json::json!({ "batches": reports, "signals": scan });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (index, report) in reports.iter().enumerate() {
        println!("Batch {}:", index + 1);
        print!("{report}");
    }
    if reports.is_empty() {
        println!("Nothing to replay");
    }
    if let Some(scan) = &scan {
        println!();
        print_report(scan);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::{BehaviorType, EventEnvelope, EventKind, StudentBehavior};
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn answer(student_id: u64, created_at: i64, correct: bool) -> String {
        let record = StudentBehavior {
            school_id: 1,
            class_id: 2,
            classroom_id: Some(30),
            student_id,
            behavior_type: BehaviorType::Answer,
            context: json!({"is_correct": correct}),
            created_at,
            ..Default::default()
        };
        let bytes = EventEnvelope::student_behavior(&record).unwrap().encode().unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_read_messages_skips_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}\n\n{}", answer(1, 1, true), answer(2, 2, false)).unwrap();

        let messages = read_messages(&path, "classroom-behavior").unwrap();

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.topic == "classroom-behavior"));
    }

    #[test]
    fn test_read_messages_missing_file_is_error() {
        let err = read_messages(Path::new("/nonexistent/events.jsonl"), "t").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_ingest_reports_and_stores_rows() {
        let config = ClasspulseConfig::default();
        let backend = Backend::open(&config.storage).await.unwrap();
        let mut messages: Vec<QueueMessage> = (1..=4)
            .map(|t| QueueMessage::new("t", answer(1, t, true).into_bytes()))
            .collect();
        messages.push(QueueMessage::new("t", b"{broken".to_vec()));

        let reports = ingest(&config, &backend, "t", messages).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].undecodable, 1);
        assert_eq!(reports[0].group(EventKind::StudentBehavior).unwrap().persisted, 4);

        let signals = ClassroomSignals::new(backend.store.clone(), backend.guard(&config));
        let scan = signals.scan(30).await.unwrap();
        assert_eq!(scan.praise_worthy.len(), 1);
    }
}
