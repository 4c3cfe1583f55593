//! Operator Console
//!
//! Reads commands from an input stream on its own task and renders registry
//! views through a bounded queue, so the data plane never waits on the
//! terminal.

pub mod command;
pub mod renderer;

pub use command::Command;
pub use renderer::{RenderRequest, Renderer, CLEAR_SCREEN};

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::registry::{PeerSnapshot, Registry};

/// What the dispatcher should do after a command
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Render(RenderRequest),
    Exit,
}

/// Turns commands into render requests against the shared registry
#[derive(Clone)]
pub struct Console {
    registry: Arc<Registry>,
    render_tx: mpsc::Sender<RenderRequest>,
}

impl Console {
    pub fn new(registry: Arc<Registry>, render_tx: mpsc::Sender<RenderRequest>) -> Self {
        Self {
            registry,
            render_tx,
        }
    }

    /// Evaluate a command. Reads the registry, never mutates it.
    pub async fn execute(&self, command: Command) -> Outcome {
        let request = match command {
            Command::List => {
                let peers = self.registry.snapshot(self.registry.now_ms()).await;
                RenderRequest::Lines(render_list(&peers))
            }
            Command::DetailedList => {
                let peers = self.registry.snapshot(self.registry.now_ms()).await;
                RenderRequest::Lines(render_detailed_list(&peers))
            }
            Command::Help => RenderRequest::Lines(render_help()),
            Command::Clear => RenderRequest::Clear,
            Command::Exit => return Outcome::Exit,
        };
        Outcome::Render(request)
    }

    /// Publish a render request. Returns `false` once the renderer is gone.
    pub async fn publish(&self, request: RenderRequest) -> bool {
        self.render_tx.send(request).await.is_ok()
    }

    /// Print the console banner. Returns `false` once the renderer is gone.
    pub async fn greet(&self) -> bool {
        let published = self
            .publish(RenderRequest::line("Type 'help' for a list of commands."))
            .await;
        if !published {
            debug!("Renderer closed before the console banner was shown");
        }
        published
    }

    /// Execute commands as they arrive. Returns on `exit` or when the
    /// command stream ends, reporting whether `exit` was requested.
    pub async fn dispatch(&self, mut commands: mpsc::Receiver<Command>) -> bool {
        while let Some(command) = commands.recv().await {
            debug!(%command, "Console command");
            match self.execute(command).await {
                Outcome::Render(request) => {
                    if !self.publish(request).await {
                        debug!("Renderer closed, stopping console dispatcher");
                        return false;
                    }
                }
                Outcome::Exit => return true,
            }
        }
        false
    }
}

/// Parse lines from `reader` and forward recognized commands
pub async fn read_commands<R>(reader: R, commands: mpsc::Sender<Command>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match Command::parse(&line) {
                Some(command) => {
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
                None => trace!(input = %line, "Ignoring unrecognized console input"),
            },
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        }
    }
}

/// Wire the console to stdin/stdout. `exit` terminates the process with
/// status 0 immediately.
pub fn spawn_stdio(registry: Arc<Registry>, queue_capacity: usize) -> JoinHandle<()> {
    let (render_tx, render_rx) = mpsc::channel(queue_capacity);
    let (command_tx, command_rx) = mpsc::channel(queue_capacity);

    tokio::spawn(async move {
        if let Err(e) = Renderer::new(tokio::io::stdout(), render_rx).run().await {
            error!("Console renderer failed: {}", e);
        }
    });

    tokio::spawn(read_commands(BufReader::new(tokio::io::stdin()), command_tx));

    let console = Console::new(registry, render_tx);
    tokio::spawn(async move {
        if console.greet().await && console.dispatch(command_rx).await {
            std::process::exit(0);
        }
    })
}

fn render_list(peers: &[PeerSnapshot]) -> Vec<String> {
    if peers.is_empty() {
        return vec!["No clients connected".to_string()];
    }

    let mut lines = vec![format!("Connected clients ({}):", peers.len())];
    lines.extend(peers.iter().map(|peer| format!("  {}", peer.addr)));
    lines
}

fn render_detailed_list(peers: &[PeerSnapshot]) -> Vec<String> {
    if peers.is_empty() {
        return vec!["No clients connected".to_string()];
    }

    let mut lines = vec![format!("Connected clients ({}):", peers.len())];
    lines.extend(peers.iter().map(|peer| {
        format!(
            "  {} - timeout in {}s",
            peer.addr,
            peer.remaining_secs()
        )
    }));
    lines
}

fn render_help() -> Vec<String> {
    let mut lines = vec!["Commands:".to_string()];
    lines.extend(
        Command::ALL
            .iter()
            .map(|command| format!("  {:<6} {}", command.name(), command.description())),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn console_with(registry: Arc<Registry>) -> (Console, mpsc::Receiver<RenderRequest>) {
        let (tx, rx) = mpsc::channel(8);
        (Console::new(registry, tx), rx)
    }

    fn lines(outcome: Outcome) -> Vec<String> {
        match outcome {
            Outcome::Render(RenderRequest::Lines(lines)) => lines,
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_empty_registry() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, _rx) = console_with(registry);

        let output = lines(console.execute(Command::List).await);
        assert_eq!(output, vec!["No clients connected".to_string()]);
    }

    #[tokio::test]
    async fn test_list_shows_addresses() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        registry.try_admit("10.0.0.2:4000".parse().unwrap()).await.unwrap();
        registry.try_admit("10.0.0.1:4000".parse().unwrap()).await.unwrap();
        let (console, _rx) = console_with(Arc::clone(&registry));

        let output = lines(console.execute(Command::List).await);
        assert_eq!(
            output,
            vec![
                "Connected clients (2):".to_string(),
                "  10.0.0.1:4000".to_string(),
                "  10.0.0.2:4000".to_string(),
            ]
        );
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detailed_list_shows_remaining_seconds() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        registry.try_admit("10.0.0.1:4000".parse().unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let (console, _rx) = console_with(registry);
        let output = lines(console.execute(Command::DetailedList).await);
        assert_eq!(output[1], "  10.0.0.1:4000 - timeout in 6s");
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, _rx) = console_with(registry);

        let output = lines(console.execute(Command::Help).await).join("\n");
        for command in Command::ALL {
            assert!(output.contains(command.name()));
        }
    }

    #[tokio::test]
    async fn test_clear_and_exit() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, _rx) = console_with(registry);

        assert_eq!(
            console.execute(Command::Clear).await,
            Outcome::Render(RenderRequest::Clear)
        );
        assert_eq!(console.execute(Command::Exit).await, Outcome::Exit);
    }

    #[tokio::test]
    async fn test_dispatch_publishes_and_stops_on_exit() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, mut render_rx) = console_with(registry);
        let (command_tx, command_rx) = mpsc::channel(8);

        command_tx.send(Command::Clear).await.unwrap();
        command_tx.send(Command::Exit).await.unwrap();
        command_tx.send(Command::Help).await.unwrap();

        assert!(console.dispatch(command_rx).await);
        assert_eq!(render_rx.recv().await, Some(RenderRequest::Clear));
        assert!(render_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_greet_publishes_banner() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, mut render_rx) = console_with(registry);

        assert!(console.greet().await);
        assert_eq!(
            render_rx.recv().await,
            Some(RenderRequest::line("Type 'help' for a list of commands."))
        );
    }

    #[tokio::test]
    async fn test_greet_reports_closed_renderer() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let (console, render_rx) = console_with(registry);
        drop(render_rx);

        assert!(!console.greet().await);
    }

    #[tokio::test]
    async fn test_read_commands_skips_unknown_lines() {
        let input: &[u8] = b"list\nbogus\n  dlist  \nexit\n";
        let (tx, mut rx) = mpsc::channel(8);

        read_commands(input, tx).await;

        assert_eq!(rx.recv().await, Some(Command::List));
        assert_eq!(rx.recv().await, Some(Command::DetailedList));
        assert_eq!(rx.recv().await, Some(Command::Exit));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_commands_across_partial_reads() {
        let input = tokio_test::io::Builder::new()
            .read(b"he")
            .read(b"lp\ncle")
            .read(b"ar\n")
            .build();
        let (tx, mut rx) = mpsc::channel(8);

        read_commands(BufReader::new(input), tx).await;

        assert_eq!(rx.recv().await, Some(Command::Help));
        assert_eq!(rx.recv().await, Some(Command::Clear));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_console_end_to_end_through_renderer() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        registry.try_admit("10.0.0.1:4000".parse().unwrap()).await.unwrap();

        let (render_tx, render_rx) = mpsc::channel(2);
        let renderer = tokio::spawn(Renderer::new(Vec::new(), render_rx).run());
        let console = Console::new(registry, render_tx);

        let (command_tx, command_rx) = mpsc::channel(2);
        tokio::spawn(read_commands(&b"list\nclear\n"[..], command_tx));

        assert!(!console.dispatch(command_rx).await);
        drop(console);

        let output = String::from_utf8(renderer.await.unwrap().unwrap()).unwrap();
        assert_eq!(
            output,
            format!("Connected clients (1):\n  10.0.0.1:4000\n{}", CLEAR_SCREEN)
        );
    }
}
