use anyhow::{anyhow, bail, Context, Result};
use client_core::{NewCase, ProcessDataInput, UserPortal};
use shared::domain::{CaseNo, ProcessDataNo, ProcessDataTypeNo, ProcessTypeNo};

use crate::render;

pub const HELP: &str = "\
commands:
  login <user> <password>          sign in
  register <user> <password>       create an account and sign in
  logout                           end the session
  search <query>                   case number or part of a client id
  select <caseno>                  make a case active
  create <type_no> <client_id> <client_type>
                                   start a new case owned by you
  add <type_no> <field> [value...] add process data to the open step's process
  edit <id> <field> [value...] [--type N]
                                   update a listed process-data item
  close                            close the open step
  refresh                          re-resolve the active case's step and lists
  show                             print the active case
  types                            list process and process-data types
  help                             this text
  quit                             leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { username: String, password: String },
    Register { username: String, password: String },
    Logout,
    Search(String),
    Select(CaseNo),
    Create {
        process_type_no: ProcessTypeNo,
        client_id: String,
        client_type: String,
    },
    Add {
        process_data_type_no: ProcessDataTypeNo,
        fieldname: String,
        value: String,
    },
    Edit {
        process_data_no: ProcessDataNo,
        process_data_type_no: Option<ProcessDataTypeNo>,
        fieldname: String,
        value: String,
    },
    Close,
    Refresh,
    Show,
    Types,
    Help,
    Quit,
}

fn number(raw: Option<&str>, what: &str) -> Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("missing {what}"))?;
    raw.parse::<i64>()
        .with_context(|| format!("{what} must be a number, got '{raw}'"))
}

fn word(raw: Option<&str>, what: &str) -> Result<String> {
    raw.map(str::to_string)
        .ok_or_else(|| anyhow!("missing {what}"))
}

/// Splits the first word off `input` and returns the rest of the line as typed.
fn next_word(input: &str) -> (Option<&str>, &str) {
    let input = input.trim_start();
    if input.is_empty() {
        return (None, input);
    }
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    (Some(&input[..end]), &input[end..])
}

/// Separates a trailing `--type N` from an edit value.
fn type_override(rest: &str) -> Result<(&str, Option<ProcessDataTypeNo>)> {
    let trimmed = rest.trim_end();
    let (head, last) = trimmed
        .rsplit_once(char::is_whitespace)
        .unwrap_or(("", trimmed));
    if last == "--type" {
        bail!("missing data type");
    }
    let head = head.trim_end();
    let (value, flag) = head
        .rsplit_once(char::is_whitespace)
        .unwrap_or(("", head));
    if flag != "--type" {
        return Ok((rest, None));
    }
    let type_no = ProcessDataTypeNo(number(Some(last), "data type")?);
    Ok((value.trim_end(), Some(type_no)))
}

impl ConsoleCommand {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let (Some(verb), rest) = next_word(line) else {
            return Ok(None);
        };
        let mut parts = rest.split_whitespace();
        let command = match verb.to_ascii_lowercase().as_str() {
            "login" => Self::Login {
                username: word(parts.next(), "username")?,
                password: word(parts.next(), "password")?,
            },
            "register" => Self::Register {
                username: word(parts.next(), "username")?,
                password: word(parts.next(), "password")?,
            },
            "logout" => Self::Logout,
            "search" => {
                let query = parts.collect::<Vec<_>>().join(" ");
                if query.is_empty() {
                    bail!("usage: search <query>");
                }
                Self::Search(query)
            }
            "select" => Self::Select(CaseNo(number(parts.next(), "case number")?)),
            "create" => Self::Create {
                process_type_no: ProcessTypeNo(number(parts.next(), "process type")?),
                client_id: word(parts.next(), "client id")?,
                client_type: word(parts.next(), "client type")?,
            },
            "add" => {
                let (type_no, rest) = next_word(rest);
                let (fieldname, rest) = next_word(rest);
                Self::Add {
                    process_data_type_no: ProcessDataTypeNo(number(type_no, "data type")?),
                    fieldname: word(fieldname, "field name")?,
                    value: rest.trim_start().to_string(),
                }
            }
            "edit" => {
                let (id, rest) = next_word(rest);
                let (fieldname, rest) = next_word(rest);
                let process_data_no = ProcessDataNo(number(id, "process data id")?);
                let fieldname = word(fieldname, "field name")?;
                let (value, process_data_type_no) = type_override(rest.trim_start())?;
                Self::Edit {
                    process_data_no,
                    process_data_type_no,
                    fieldname,
                    value: value.to_string(),
                }
            }
            "close" => Self::Close,
            "refresh" => Self::Refresh,
            "show" => Self::Show,
            "types" => Self::Types,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}', try 'help'"),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Runs one command. Portal failures are already published as notices and rendered
/// by the event printer, so they are not reported again here.
pub async fn execute(portal: &UserPortal, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Login { username, password } => {
            let _ = portal.login(&username, &password).await;
        }
        ConsoleCommand::Register { username, password } => {
            let _ = portal.register(&username, &password).await;
        }
        ConsoleCommand::Logout => portal.logout().await,
        ConsoleCommand::Search(query) => {
            let _ = portal.search(&query).await;
        }
        ConsoleCommand::Select(case_no) => {
            let _ = portal.select_case_no(case_no).await;
        }
        ConsoleCommand::Create {
            process_type_no,
            client_id,
            client_type,
        } => {
            let _ = portal
                .create_case(NewCase {
                    process_type_no: Some(process_type_no),
                    client_id,
                    client_type,
                })
                .await;
        }
        ConsoleCommand::Add {
            process_data_type_no,
            fieldname,
            value,
        } => {
            let _ = portal
                .add_process_data(ProcessDataInput::new(process_data_type_no, fieldname, value))
                .await;
        }
        ConsoleCommand::Edit {
            process_data_no,
            process_data_type_no,
            fieldname,
            value,
        } => {
            let listed = portal
                .find_process_data(process_data_no)
                .await
                .map(|item| item.process_data_type_no);
            let input = ProcessDataInput {
                process_data_type_no: process_data_type_no.or(listed),
                fieldname,
                value,
            };
            let _ = portal.update_process_data(process_data_no, input).await;
        }
        ConsoleCommand::Close => {
            let _ = portal.close_step().await;
        }
        ConsoleCommand::Refresh => {
            if portal.refresh_step().await.is_ok() {
                let _ = portal.refresh_views().await;
            }
        }
        ConsoleCommand::Show => println!("{}", render::snapshot(&portal.snapshot().await)),
        ConsoleCommand::Types => {
            println!("{}", render::reference(&portal.snapshot().await.reference))
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}
