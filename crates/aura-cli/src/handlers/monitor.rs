//! Monitor command handler.
//!
//! Runs the presence engine against the local microphone with no remote
//! model attached. Outbound chunks are counted and, with `--chunks-out`,
//! recorded in their JSON transport form. Every published snapshot is
//! printed.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aura_core::{AgentRoster, LexiconClassifier, PresenceSettings, PresenceSnapshot};
use aura_presence::{
    AudioChunk, ChannelConversation, CpalMicrophone, MicrophoneSource, PresenceComponents, PresenceRuntime,
    SpeechRecognizer, TokioClock,
};
use tokio_util::sync::CancellationToken;

use crate::parser::MonitorArgs;

/// Execute the monitor command.
pub async fn execute(args: MonitorArgs, settings: PresenceSettings) -> Result<()> {
    let mut roster = AgentRoster::new();
    let agent = roster.set_current(&args.agent)?.clone();
    tracing::info!(agent = %agent.id, voice = %agent.voice, "Starting presence monitor");

    let microphone: Arc<dyn MicrophoneSource> = match args.device.clone() {
        Some(name) => Arc::new(CpalMicrophone::with_device(name)),
        None => Arc::new(CpalMicrophone::new()),
    };
    let recognizer = load_recognizer(&args, &microphone)?;
    if recognizer.is_none() {
        println!("Speech recognition unavailable; listening emotion stays neutral.");
    }

    let mut recording = args
        .chunks_out
        .as_deref()
        .map(create_recording)
        .transpose()?;

    let (conversation, mut outbound) = ChannelConversation::new();
    let drain = tokio::spawn(async move {
        let mut chunks = 0u64;
        let mut bytes = 0usize;
        while let Some(chunk) = outbound.recv().await {
            chunks += 1;
            bytes += chunk.data.len();
            tracing::trace!(seq = chunk.seq, len = chunk.data.len(), "Outbound chunk");
            if let Some(out) = recording.as_mut() {
                if let Err(e) = write_chunk_line(out, &chunk) {
                    tracing::warn!(error = %e, "Stopped recording outbound chunks");
                    recording = None;
                }
            }
        }
        if let Some(mut out) = recording {
            if let Err(e) = out.flush() {
                tracing::warn!(error = %e, "Failed to flush chunk recording");
            }
        }
        (chunks, bytes)
    });

    let components = PresenceComponents {
        settings,
        microphone,
        recognizer,
        remote: Arc::new(conversation),
        classifier: Arc::new(LexiconClassifier::new()),
        clock: Arc::new(TokioClock),
    };
    let (runtime, handle) = PresenceRuntime::new(components).context("Invalid presence settings")?;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(runtime.run(cancel.clone()));

    handle.connect().await.context("Failed to open the microphone")?;
    if args.muted {
        handle.mute().await?;
    }

    println!(
        "Monitoring as {} ({}). Press Ctrl-C to stop.",
        agent.name, agent.id
    );

    let mut snapshots = handle.subscribe();
    let deadline = args.seconds.map(Duration::from_secs);
    let timeout = async {
        match deadline {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout);

    print_snapshot(&snapshots.borrow_and_update(), args.json)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            () = &mut timeout => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot, args.json)?;
            }
        }
    }

    cancel.cancel();
    task.await.context("Presence runtime panicked")?;
    drop(handle);

    let (chunks, bytes) = drain.await.context("Chunk drain task panicked")?;
    println!("Captured {chunks} chunk(s), {bytes} byte(s) of PCM audio.");
    Ok(())
}

fn create_recording(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create chunk recording {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Append one chunk as a JSON line.
fn write_chunk_line(out: &mut impl Write, chunk: &AudioChunk) -> Result<()> {
    serde_json::to_writer(&mut *out, chunk)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn print_snapshot(snapshot: &PresenceSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    let connection = match (snapshot.connection.is_connected(), snapshot.muted) {
        (false, _) => "disconnected",
        (true, true) => "muted",
        (true, false) => "live",
    };
    let mut line = format!(
        "[{connection:<12}] face={:<7} talking={:<5} listening={:<5} mic={:.3}",
        snapshot.display_emotion().as_str(),
        snapshot.affect.agent_talking,
        snapshot.affect.user_listening,
        snapshot.user_volume,
    );
    if let Some(error) = &snapshot.capture_error {
        let _ = write!(line, " error={error}");
    }
    println!("{line}");
    Ok(())
}

#[cfg(feature = "whisper")]
fn load_recognizer(
    args: &MonitorArgs,
    microphone: &Arc<dyn MicrophoneSource>,
) -> Result<Option<Arc<dyn SpeechRecognizer>>> {
    let Some(path) = &args.whisper_model else {
        return Ok(None);
    };
    let recognizer = aura_presence::backend::WhisperRecognizer::load(path, Arc::clone(microphone))
        .with_context(|| format!("Failed to load whisper model {}", path.display()))?;
    Ok(Some(Arc::new(recognizer)))
}

#[cfg(not(feature = "whisper"))]
fn load_recognizer(
    args: &MonitorArgs,
    _microphone: &Arc<dyn MicrophoneSource>,
) -> Result<Option<Arc<dyn SpeechRecognizer>>> {
    if args.whisper_model.is_some() {
        tracing::warn!("Built without the `whisper` feature; ignoring --whisper-model");
    }
    Ok(None)
}
