//! # Command Line Rover
//!
//! Interactive console for the mechanisms command server. Typed commands are checked locally
//! before being sent, `raw` sends the rest of the line untouched.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use comms_if::{
    net::{LineConn, LineEvent},
    tc::{Tc, TcCmd, TcResponse},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::time::Duration;
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "robot $ ";
const HISTORY_PATH: &str = "data/history.txt";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "command_line_rover", about = "Console for the robot command server")]
struct Opt {
    /// Address of the command server
    #[structopt(default_value = "127.0.0.1:5555")]
    server: String,

    /// How long to wait for a reply
    #[structopt(long, default_value = "2000")]
    reply_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Action {
    /// Send this line to the server
    Send(String),

    /// Leave without sending anything
    Exit,

    Nothing,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let mut conn = LineConn::connect(
        opt.server.as_str(),
        CONNECT_TIMEOUT,
        Some(Duration::from_millis(opt.reply_timeout_ms)),
    )
    .wrap_err_with(|| format!("Could not connect to {}", opt.server))?;

    println!("Connected to {}, `help` lists the commands", opt.server);

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                // Leave the robot stopped
                send(&mut conn, &Tc::Quit.to_string()).ok();
                break;
            }
            Err(e) => {
                println!("Unhandled Error: {:?}", e);
                break;
            }
        };

        rl.add_history_entry(line.as_str()).ok();

        match parse(&line) {
            Ok(Action::Send(cmd)) => match send(&mut conn, &cmd)? {
                Some(reply) => {
                    println!("{}", reply);
                    if TcResponse::from_line(&reply) == Some(TcResponse::Bye) {
                        break;
                    }
                }
                None => {
                    println!("Server closed the connection");
                    break;
                }
            },
            Ok(Action::Exit) => break,
            Ok(Action::Nothing) => (),
            Err(e) => println!("{}", e),
        }
    }

    if rl.save_history(HISTORY_PATH).is_err() {
        println!("Could not save the history to {}", HISTORY_PATH);
    }

    conn.close();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Turn a console line into an action.
fn parse(line: &str) -> Result<Action, structopt::clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.first() {
        None => Ok(Action::Nothing),
        Some(&"exit") => Ok(Action::Exit),
        Some(&"raw") => Ok(Action::Send(words[1..].join(" "))),
        Some(_) => {
            let cmd = TcCmd::from_iter_safe(std::iter::once("robot").chain(words))?;
            Ok(Action::Send(Tc::from(cmd).to_string()))
        }
    }
}

/// Send a line and wait for the reply, `None` if the server went away.
fn send(conn: &mut LineConn, line: &str) -> Result<Option<String>> {
    conn.send_line(line).wrap_err("Could not send the command")?;

    match conn.recv().wrap_err("Could not read the reply")? {
        LineEvent::Line(l) => Ok(Some(l)),
        LineEvent::Timeout => Ok(Some("<no reply>".into())),
        LineEvent::Closed => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(parse("  ").unwrap(), Action::Nothing);
        assert_eq!(parse("exit").unwrap(), Action::Exit);
        assert_eq!(parse("move 0 1").unwrap(), Action::Send("MOVE 0 1".into()));
        assert_eq!(parse("cam -0.5 0.25").unwrap(), Action::Send("CAMERA -0.5 0.25".into()));
        assert_eq!(parse("stop").unwrap(), Action::Send("STOP".into()));
        assert_eq!(parse("raw 0.5   0.5").unwrap(), Action::Send("0.5 0.5".into()));

        assert!(parse("move fast").is_err());
        assert!(parse("dance").is_err());
    }
}
