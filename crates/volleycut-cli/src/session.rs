//! Interactive marking session
//!
//! Reads keys and commands from stdin while mirroring playback events and
//! printing notices. Failures become notices; only end of input or `:quit`
//! ends the session.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info};
use volleycut_core::autotag::AutoTagger;
use volleycut_core::playback::PlaybackEvent;
use volleycut_core::{
    format_timecode, ClipId, CoreError, CoreResult, Notice, NoticeLevel, Transport,
};

use crate::clipboard::copy_to_clipboard;
use crate::input::{parse_line, ClipRef, SessionCommand, SessionInput, HELP};
use crate::prompt::{read_line, SharedStdin};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    transport: Transport,
    tagger: AutoTagger,
    stdin: SharedStdin,
    notices: broadcast::Receiver<Notice>,
}

impl Session {
    pub fn new(transport: Transport, tagger: AutoTagger, stdin: SharedStdin) -> Self {
        let notices = transport.notifier().subscribe();
        Self {
            transport,
            tagger,
            stdin,
            notices,
        }
    }

    pub async fn run(mut self, initial: Option<String>) -> anyhow::Result<()> {
        println!("VolleyCut. Type :help for keys and commands.");

        if let Some(source) = initial {
            let _ = self.transport.load(&source).await;
            self.flush_notices();
        }

        loop {
            tokio::select! {
                line = read_line(&self.stdin) => match line? {
                    Some(line) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    None => break,
                },
                event = self.transport.next_event() => report_event(&event),
                notice = self.notices.recv() => match notice {
                    Ok(notice) => print_notice(&notice),
                    Err(RecvError::Lagged(skipped)) => debug!("Skipped {} notices", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("Session ended with {} clip(s)", self.transport.clips().len());
        self.transport.reset().await;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let flow = match parse_line(line) {
            Ok(SessionInput::Empty) => Flow::Continue,
            Ok(SessionInput::Key(input)) => {
                let result = self.transport.handle_key(&input).await;
                self.report(result);
                Flow::Continue
            }
            Ok(SessionInput::Command(command)) => self.run_command(command).await,
            Err(e) => {
                self.transport.notifier().error(e.to_string());
                Flow::Continue
            }
        };

        self.flush_notices();
        flow
    }

    async fn run_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Load(source) => {
                // Load reports its own outcome
                let _ = self.transport.load(&source).await;
            }
            SessionCommand::Reset => self.transport.reset().await,
            SessionCommand::PlayClip(clip) => {
                let result = match self.resolve_clip(&clip) {
                    Ok(id) => self.transport.play_clip(&id).await,
                    Err(e) => Err(e),
                };
                self.report(result);
            }
            SessionCommand::Seek(seconds) => {
                let result = self.transport.seek_to(seconds).await;
                self.report(result);
            }
            SessionCommand::AutoTag(clip) => match self.resolve_clip(&clip) {
                Ok(id) => {
                    let _ = self.tagger.tag_clip(&mut self.transport, &id).await;
                }
                Err(e) => self.report::<()>(Err(e)),
            },
            SessionCommand::AutoTagAll => {
                let summary = self.tagger.tag_all(&mut self.transport).await;
                debug!("Batch summary: {:?}", summary);
            }
            SessionCommand::Clips => self.print_clips(),
            SessionCommand::Export => self.export().await,
            SessionCommand::Status => self.print_status().await,
            SessionCommand::Help => println!("{}", HELP),
            SessionCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// 1-based list position or clip id
    fn resolve_clip(&self, clip: &ClipRef) -> CoreResult<ClipId> {
        let clips = self.transport.clips();
        let found = match clip {
            ClipRef::Index(index) => index
                .checked_sub(1)
                .and_then(|i| clips.get_index(i))
                .map(|c| c.id.clone()),
            ClipRef::Id(id) => clips.get(id).map(|c| c.id.clone()),
        };

        found.ok_or_else(|| {
            CoreError::ClipNotFound(match clip {
                ClipRef::Index(index) => index.to_string(),
                ClipRef::Id(id) => id.clone(),
            })
        })
    }

    async fn export(&self) {
        let notifier = self.transport.notifier();
        let json = match self.transport.clips().export_json() {
            Ok(json) => json,
            Err(e) => {
                notifier.error(e.to_string());
                return;
            }
        };

        println!("{}", json);
        match copy_to_clipboard(&json).await {
            Ok(()) => notifier.success("Clips JSON copied to clipboard"),
            Err(e) => {
                debug!("Clipboard copy failed: {}", e);
                notifier.error("Failed to copy");
            }
        }
    }

    fn print_clips(&self) {
        let clips = self.transport.clips();
        if clips.is_empty() {
            println!("No clips yet. Mark in (i), mark out (o), save (shift+s).");
            return;
        }
        for (i, clip) in clips.iter().enumerate() {
            println!(
                "{:>3}. {}  {:<6}  {}",
                i + 1,
                clip.range_label(),
                clip.tag.as_str(),
                clip.id
            );
        }
    }

    async fn print_status(&mut self) {
        let position = self.transport.current_time().await;
        let state = self.transport.state().clone();
        let mark = |m: Option<f64>| m.map(format_timecode).unwrap_or_else(|| "--".to_string());

        match self.transport.source() {
            Some(source) => println!("source:   {}", source),
            None => println!("source:   none"),
        }
        println!("state:    {:?}", self.transport.transport_state());
        println!(
            "position: {} / {}",
            format_timecode(position),
            format_timecode(state.duration)
        );
        println!(
            "marks:    in {}  out {}{}",
            mark(state.mark_in),
            mark(state.mark_out),
            if state.can_save() { "" } else { "  (cannot save)" }
        );
        println!("tag:      {}", self.transport.active_tag());
        println!("clips:    {}", self.transport.clips().len());
    }

    fn report<T>(&self, result: CoreResult<T>) {
        if let Err(e) = result {
            self.transport.notifier().error(e.to_string());
        }
    }

    fn flush_notices(&mut self) {
        loop {
            match self.notices.try_recv() {
                Ok(notice) => print_notice(&notice),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

fn report_event(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::ClipEnded { at } => println!("[stopped at {}]", format_timecode(*at)),
        PlaybackEvent::Ended => println!("[end of video]"),
        _ => {}
    }
}

fn print_notice(notice: &Notice) {
    let marker = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Message => "..",
        NoticeLevel::Error => "error",
    };
    println!("[{}] {}", marker, notice.text);
}
