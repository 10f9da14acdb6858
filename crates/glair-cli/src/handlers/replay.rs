//! `glair replay`: a full session against a scripted in-memory remote.
//!
//! The script is JSON lines. Each line is either a server message
//! (`{"serverContent": …}`, `{"toolCall": …}`) delivered to the session, or a
//! pause `{"delayMs": 500}`. Blank lines and lines starting with `#` are
//! skipped. While the script runs, the synthetic microphone and the optional
//! camera image stream upstream; outbound traffic is tallied and printed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use glair_live::{
    ClientMessage, LoopbackConnector, RealtimeSession, RemoteEnd, ServerMessage, SessionEvent, SyntheticDevices,
    ToolRegistry, VirtualOutput, WeatherTool,
};
use glair_media::{LiveSettings, StillFrameSource};

use crate::commands::ReplayArgs;
use crate::error::CliError;

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Wait(Duration),
    Message(ServerMessage),
}

/// Outbound traffic seen by the scripted remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundTally {
    pub setup: usize,
    pub audio_blocks: usize,
    pub frames: usize,
    pub tool_responses: usize,
}

impl OutboundTally {
    fn record(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::Setup(setup) => {
                tracing::info!(model = %setup.model, voice = %setup.voice_name, "Setup received");
                self.setup += 1;
            }
            ClientMessage::RealtimeInput { media } if media.is_pcm() => self.audio_blocks += 1,
            ClientMessage::RealtimeInput { .. } => self.frames += 1,
            ClientMessage::ToolResponse { function_responses } => {
                for response in function_responses {
                    tracing::info!(
                        id = ?response.id,
                        name = %response.name,
                        result = %response.response.result,
                        "Tool response received"
                    );
                }
                self.tool_responses += 1;
            }
        }
    }
}

/// Parse a replay script.
pub fn parse_script(raw: &str) -> Result<Vec<ScriptStep>, CliError> {
    let mut steps = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| CliError::Arguments(format!("script line {}: {e}", index + 1)))?;

        if let Some(ms) = value.get("delayMs") {
            let ms = ms
                .as_u64()
                .ok_or_else(|| CliError::Arguments(format!("script line {}: delayMs must be an integer", index + 1)))?;
            steps.push(ScriptStep::Wait(Duration::from_millis(ms)));
        } else {
            let message: ServerMessage = serde_json::from_value(value)
                .map_err(|e| CliError::Arguments(format!("script line {}: {e}", index + 1)))?;
            steps.push(ScriptStep::Message(message));
        }
    }
    Ok(steps)
}

/// Execute the replay command.
pub async fn execute(settings: LiveSettings, args: ReplayArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.script).map_err(CliError::from)?;
    let steps = parse_script(&raw)?;

    let mut devices = SyntheticDevices::new().tone(args.tone_hz);
    if let Some(ref camera) = args.camera {
        devices = devices.camera(StillFrameSource::open(camera).map_err(CliError::from)?);
    }

    let tally = run_script(settings, devices, steps, Duration::from_secs(args.capture_secs)).await?;

    println!("Replay finished: {}", args.script.display());
    println!("  setup messages:   {}", tally.setup);
    println!("  audio blocks:     {}", tally.audio_blocks);
    println!("  camera frames:    {}", tally.frames);
    println!("  tool responses:   {}", tally.tool_responses);
    Ok(())
}

/// Connect, play the script, capture for `linger` and close.
pub async fn run_script(
    settings: LiveSettings,
    devices: SyntheticDevices,
    steps: Vec<ScriptStep>,
    linger: Duration,
) -> Result<OutboundTally, CliError> {
    let (connector, mut remotes) = LoopbackConnector::new();
    let tools = ToolRegistry::new().with(Arc::new(WeatherTool::new(settings.tool_delay())));
    let (mut session, events) = RealtimeSession::new(
        settings,
        Arc::new(connector),
        Arc::new(devices),
        VirtualOutput::new(),
        tools,
    );
    let printer = tokio::spawn(print_events(events));

    session.connect().await?;
    let remote = remotes
        .recv()
        .await
        .ok_or_else(|| CliError::Session("loopback remote missing".into()))?;

    if !linger.is_zero() {
        session.start_capture().await?;
    }

    let feeder = tokio::spawn(drive_remote(remote, steps, linger));
    session.run().await?;
    drop(session);

    let tally = feeder
        .await
        .map_err(|e| CliError::Session(format!("script task failed: {e}")))?;
    // The event channel closes with the session.
    let _ = printer.await;
    Ok(tally)
}

async fn drive_remote(mut remote: RemoteEnd, steps: Vec<ScriptStep>, linger: Duration) -> OutboundTally {
    let mut tally = OutboundTally::default();

    for step in steps {
        match step {
            ScriptStep::Wait(delay) => pump_for(&mut remote, &mut tally, delay).await,
            ScriptStep::Message(message) => {
                if remote.send_message(message).await.is_err() {
                    tracing::warn!("Session went away before the script finished");
                    return tally;
                }
            }
        }
        while let Ok(message) = remote.outbound.try_recv() {
            tally.record(&message);
        }
    }

    pump_for(&mut remote, &mut tally, linger).await;
    remote.close("replay finished").await;
    tally
}

/// Record outbound traffic for `duration`.
async fn pump_for(remote: &mut RemoteEnd, tally: &mut OutboundTally, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        tokio::select! {
            message = remote.recv() => match message {
                Some(message) => tally.record(&message),
                None => break,
            },
            () = tokio::time::sleep_until(deadline) => break,
        }
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StateChanged(state) => tracing::info!(?state, "State"),
            SessionEvent::CaptionChanged(caption) if caption.is_empty() => {}
            SessionEvent::CaptionChanged(caption) => println!("» {caption}"),
            SessionEvent::Status(status) => tracing::info!("{status}"),
            SessionEvent::Error(message) => eprintln!("✗ {message}"),
            SessionEvent::AccessDenied(message) => eprintln!("✗ Access denied: {message}"),
            SessionEvent::ToolResponded(names) => tracing::info!(tools = ?names, "Tool response sent"),
            SessionEvent::InputLevel(_) | SessionEvent::OutputLevel(_) | SessionEvent::MuteChanged { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
# greeting
{"serverContent":{"outputTranscription":{"text":"Hi"},"modelTurn":{"parts":[{"inlineData":{"data":"AAAAAAAA","mimeType":"audio/pcm;rate=24000"}}]}}}
{"delayMs": 50}
{"serverContent":{"turnComplete":true}}
"#;

    #[test]
    fn parses_messages_and_pauses() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[0], ScriptStep::Message(_)));
        assert_eq!(steps[1], ScriptStep::Wait(Duration::from_millis(50)));
    }

    #[test]
    fn bad_line_reports_its_number() {
        let err = parse_script("{\"delayMs\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn replay_runs_to_close() {
        let steps = parse_script(SCRIPT).unwrap();
        let tally = tokio_test::block_on(run_script(
            LiveSettings::default(),
            SyntheticDevices::new(),
            steps,
            Duration::ZERO,
        ))
        .unwrap();
        assert_eq!(tally.setup, 1);
        assert_eq!(tally.audio_blocks, 0);
    }
}
