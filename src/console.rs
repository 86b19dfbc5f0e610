use std::{io::BufRead, path::PathBuf};
use tokio::sync::mpsc;

use crate::{config, listener::ListenerStatus, shortener::Shortener};

const HELP: &str = "\
commands:
  shorten <url> [alias]   create (or reuse) a short link
  delete <code>           remove a short link
  list                    show all short links
  port <n>                move the redirect listener to port n (1024-65535)
  export <path>           write the link table to a file
  help                    show this message
  quit                    save and exit";

/// One line of console input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Shorten { url: String, alias: Option<String> },
    Delete(String),
    List,
    Port(String),
    Export(PathBuf),
    Help,
    Quit,
}

impl Command {
    /// Parse a console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("shorten" | "add", [url]) => Command::Shorten {
                url: (*url).to_owned(),
                alias: None,
            },
            ("shorten" | "add", [url, alias]) => Command::Shorten {
                url: (*url).to_owned(),
                alias: Some((*alias).to_owned()),
            },
            ("delete" | "rm", [code]) => Command::Delete((*code).to_owned()),
            ("list" | "ls", []) => Command::List,
            ("port", [port]) => Command::Port((*port).to_owned()),
            ("export", [path]) => Command::Export(PathBuf::from(*path)),
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => return Err(format!("unrecognised command '{}', try 'help'", line.trim())),
        };

        Ok(Some(command))
    }
}

/// Read stdin on a plain thread and forward lines. The thread is not joined:
/// a blocked read must not hold up shutdown.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive the shortener from console lines until `quit` or end of input.
pub async fn run(shortener: &Shortener, mut lines: mpsc::UnboundedReceiver<String>) {
    println!("{HELP}");

    while let Some(line) = lines.recv().await {
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => println!("{}", execute(shortener, command).await),
            Err(message) => println!("{message}"),
        }
    }
}

/// Run one command and render its outcome for the console.
pub async fn execute(shortener: &Shortener, command: Command) -> String {
    match command {
        Command::Shorten { url, alias } => match shortener.create(&url, alias.as_deref()) {
            Ok(link) => format!("short link ready: {}", link.short_url),
            Err(e) => format!("rejected: {e}"),
        },
        Command::Delete(code) => match shortener.delete(&code) {
            Some(link) => format!("deleted {}", link.code),
            None => format!("no short link '{code}'"),
        },
        Command::List => render_table(shortener),
        Command::Port(raw) => {
            let port = match config::parse_port(&raw) {
                Ok(port) => port,
                Err(e) => return format!("failed to change port: {e}"),
            };
            match shortener.change_port(port).await {
                Ok(effective) if effective == port => {
                    format!("server restarted on {}/{{code}}", shortener.base_url())
                }
                Ok(effective) => format!(
                    "port {port} in use, server restarted on random port {effective}"
                ),
                Err(e) => {
                    tracing::error!("Port change to {} failed: {}", port, e);
                    format!("failed to change port: {e} (still on {})", shortener.port())
                }
            }
        }
        Command::Export(path) => match shortener.export(&path) {
            Ok(()) => format!("exported: {}", path.display()),
            Err(e) => {
                tracing::error!("Export failed: {}", e);
                format!("export failed: {e}")
            }
        },
        Command::Help => HELP.to_owned(),
        Command::Quit => "bye".to_owned(),
    }
}

fn render_table(shortener: &Shortener) -> String {
    let status = match shortener.listener_status() {
        ListenerStatus::Listening(_) => format!("server: {}/{{code}}", shortener.base_url()),
        ListenerStatus::Starting => "server: starting".to_owned(),
        ListenerStatus::Stopped => "server: stopped".to_owned(),
    };

    let links = shortener.list();
    if links.is_empty() {
        return format!("{status}\nno short links yet");
    }

    let rows = links
        .iter()
        .map(|link| {
            format!(
                "{:<14} {:<44} {:<20} {}",
                link.code,
                link.short_url,
                link.created_at_display(),
                link.original_url
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{status}\n{rows}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codegen::CodeGenerator, config::AppConfig};
    use tempfile::TempDir;

    fn shortener(dir: &TempDir) -> Shortener {
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            public_host: "localhost".into(),
            data_file: dir.path().join("urls.csv"),
        };
        Shortener::new(&config, CodeGenerator::seeded(5))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("shorten example.com"),
            Ok(Some(Command::Shorten {
                url: "example.com".into(),
                alias: None
            }))
        );
        assert_eq!(
            Command::parse("add example.com ex"),
            Ok(Some(Command::Shorten {
                url: "example.com".into(),
                alias: Some("ex".into())
            }))
        );
        assert_eq!(Command::parse("rm abc"), Ok(Some(Command::Delete("abc".into()))));
        assert_eq!(Command::parse("LIST"), Ok(Some(Command::List)));
        assert_eq!(Command::parse("port 9090"), Ok(Some(Command::Port("9090".into()))));
        assert_eq!(
            Command::parse("export out.csv"),
            Ok(Some(Command::Export(PathBuf::from("out.csv"))))
        );
        assert_eq!(Command::parse("quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn rejects_unknown_or_malformed_commands() {
        assert!(Command::parse("frobnicate").is_err());
        assert!(Command::parse("shorten").is_err());
        assert!(Command::parse("delete a b").is_err());
    }

    #[tokio::test]
    async fn executes_against_the_shortener() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir);

        let out = execute(
            &app,
            Command::Shorten {
                url: "example.com".into(),
                alias: Some("ex1".into()),
            },
        )
        .await;
        assert_eq!(out, "short link ready: http://localhost:8080/ex1");

        let out = execute(
            &app,
            Command::Shorten {
                url: "other.test".into(),
                alias: Some("ex1".into()),
            },
        )
        .await;
        assert!(out.starts_with("rejected:"));

        assert!(execute(&app, Command::List).await.contains("http://example.com/"));
        assert_eq!(execute(&app, Command::Delete("ex1".into())).await, "deleted ex1");
        assert_eq!(
            execute(&app, Command::List).await,
            "server: stopped\nno short links yet"
        );
    }

    #[tokio::test]
    async fn invalid_port_is_reported_not_applied() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir);

        let out = execute(&app, Command::Port("80".into())).await;
        assert!(out.starts_with("failed to change port"));
        assert_eq!(app.port(), 8080);
    }
}
