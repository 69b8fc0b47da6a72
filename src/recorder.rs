// ===============================
// src/recorder.rs
// ===============================
//
// JSONL audit trail of session activity:
// - satu baris per Event (append), dicap waktu saat ditulis
// - BufWriter, flush tiap 1s dan/atau tiap 100 event
// - hanya ditulis, tidak pernah dibaca ulang saat startup
//
// ENV: set `RECORD_FILE=/path/to/session.jsonl` agar aktif (lihat main.rs).
//
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::{Command, Symbol};
use crate::session::ReplaySummary;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    CommandAppended { line: String, command: Command },
    ReplayFinished(ReplaySummary),
    ReplayFailed { symbol: Symbol, code: &'static str, message: String },
    SessionReset { log_len: usize },
}

#[derive(Serialize)]
struct Record<'a> {
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a Event,
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<tokio::fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;
    const FLUSH_EVERY_N_EVENTS: u32 = 100;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&Record { ts: Utc::now(), event: &ev }) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => {
                            writer = w;
                            if let Err(e2) = write_line(&mut writer, &line).await {
                                error!(?e2, "recorder: write failed again after reopen, drop event");
                                continue;
                            }
                        }
                        Err(e2) => {
                            error!(?e2, "recorder: reopen failed, recording stopped");
                            break;
                        }
                    }
                }
                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
