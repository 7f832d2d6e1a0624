// Console commands over the shared state

use std::fmt::Write as _;
use tracing::info;

use crate::core::error::{CommandError, UserError};
use crate::core::state::AppState;
use crate::models::id::RecordId;
use crate::models::key::{KeyRecord, StatusFilter};
use crate::models::user::{NewUser, Role, User, UserPatch, UserStatus};
use crate::services::dashboard::DashboardStats;
use crate::services::session::LoginMode;
use crate::utils::time::today;

pub const USAGE: &str = "\
usage: keybureau [config.toml] <command> [args...]

commands:
  stats                                   dashboard figures
  keys [status|all] [search]              list keys
  key-add <office> <department>           register a key
  key-issue <id> <recipient>              hand a key out
  key-return <id>                         take a key back
  key-lost <id>                           report a key lost
  key-recover <id>                        put a lost key back in circulation
  key-delete <id>                         remove a key
  users [role]                            list accounts
  user-add <name> <email> <department> [role] [--login L] [--password P] [--barcode B]
  user-update <id> [--name N] [--email E] [--department D] [--login L]
              [--password P] [--barcode B] [--role R] [--status S]
  user-delete <id>
  login <login|email> <password> [--admin]
  logout
  whoami
  scan <code>                             resolve a badge
  reset-password <email>
  save                                    write all data to the store
  compact                                 rewrite the store log";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Stats,
    Keys { status: StatusFilter, search: String },
    KeyAdd { office: String, department: String },
    KeyIssue { id: RecordId, recipient: String },
    KeyReturn { id: RecordId },
    KeyLost { id: RecordId },
    KeyRecover { id: RecordId },
    KeyDelete { id: RecordId },
    Users { role: Option<Role> },
    UserAdd { fields: NewUser },
    UserUpdate { id: RecordId, patch: UserPatch },
    UserDelete { id: RecordId },
    Login { identifier: String, password: String, mode: LoginMode },
    Logout,
    Whoami,
    Scan { code: String },
    ResetPassword { email: String },
    Save,
    Compact,
}

impl Command {
    /// Parse the arguments that follow the config path
    pub fn parse(args: &[String]) -> Result<Self, CommandError> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Stats);
        };
        let mut rest = rest.iter().map(String::as_str);

        let command = match name.as_str() {
            "stats" => Command::Stats,
            "keys" => {
                let status = match rest.next() {
                    Some(raw) => raw.parse::<StatusFilter>().map_err(CommandError::InvalidArgument)?,
                    None => StatusFilter::All,
                };
                let search = rest.collect::<Vec<_>>().join(" ");
                Command::Keys { status, search }
            }
            "key-add" => Command::KeyAdd {
                office: required(rest.next(), "office")?,
                department: joined(rest, "department")?,
            },
            "key-issue" => Command::KeyIssue {
                id: parse_id(rest.next())?,
                recipient: joined(rest, "recipient")?,
            },
            "key-return" => Command::KeyReturn {
                id: parse_id(rest.next())?,
            },
            "key-lost" => Command::KeyLost {
                id: parse_id(rest.next())?,
            },
            "key-recover" => Command::KeyRecover {
                id: parse_id(rest.next())?,
            },
            "key-delete" => Command::KeyDelete {
                id: parse_id(rest.next())?,
            },
            "users" => Command::Users {
                role: rest.next().map(parse_role).transpose()?,
            },
            "user-add" => {
                let mut fields = NewUser {
                    name: required(rest.next(), "name")?,
                    email: required(rest.next(), "email")?,
                    department: required(rest.next(), "department")?,
                    ..Default::default()
                };
                let mut rest = rest.peekable();
                if let Some(role) = rest.next_if(|arg| !arg.starts_with("--")) {
                    fields.role = Some(parse_role(role)?);
                }
                for (option, value) in options(rest)? {
                    match option {
                        "role" => fields.role = Some(parse_role(&value)?),
                        "login" => fields.login = Some(value),
                        "password" => fields.password = Some(value),
                        "barcode" => fields.barcode = Some(value),
                        other => return Err(unknown_option(other)),
                    }
                }
                Command::UserAdd { fields }
            }
            "user-update" => {
                let id = parse_id(rest.next())?;
                let mut patch = UserPatch::default();
                for (option, value) in options(rest)? {
                    match option {
                        "name" => patch.name = Some(value),
                        "email" => patch.email = Some(value),
                        "department" => patch.department = Some(value),
                        "login" => patch.login = Some(value),
                        "password" => patch.password = Some(value),
                        "barcode" => patch.barcode = Some(value),
                        "role" => patch.role = Some(parse_role(&value)?),
                        "status" => {
                            patch.status = Some(
                                value
                                    .parse::<UserStatus>()
                                    .map_err(CommandError::InvalidArgument)?,
                            )
                        }
                        other => return Err(unknown_option(other)),
                    }
                }
                if patch == UserPatch::default() {
                    return Err(CommandError::MissingArgument("field to change"));
                }
                Command::UserUpdate { id, patch }
            }
            "user-delete" => Command::UserDelete {
                id: parse_id(rest.next())?,
            },
            "login" => {
                let identifier = required(rest.next(), "login")?;
                let password = required(rest.next(), "password")?;
                let mode = match rest.next() {
                    Some("--admin") => LoginMode::Admin,
                    Some(other) => {
                        return Err(CommandError::InvalidArgument(format!(
                            "unexpected argument '{}'",
                            other
                        )))
                    }
                    None => LoginMode::Employee,
                };
                Command::Login {
                    identifier,
                    password,
                    mode,
                }
            }
            "logout" => Command::Logout,
            "whoami" => Command::Whoami,
            "scan" => Command::Scan {
                code: required(rest.next(), "code")?,
            },
            "reset-password" => Command::ResetPassword {
                email: required(rest.next(), "email")?,
            },
            "save" => Command::Save,
            "compact" => Command::Compact,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };

        Ok(command)
    }
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, CommandError> {
    value
        .map(str::to_string)
        .ok_or(CommandError::MissingArgument(name))
}

/// Remaining words joined by spaces, so names need no quoting
fn joined<'a>(
    rest: impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<String, CommandError> {
    let value = rest.collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err(CommandError::MissingArgument(name));
    }
    Ok(value)
}

/// `--option value` pairs; a value runs until the next option
fn options<'a>(
    rest: impl Iterator<Item = &'a str>,
) -> Result<Vec<(&'a str, String)>, CommandError> {
    let mut pairs: Vec<(&str, Vec<&str>)> = Vec::new();
    for arg in rest {
        if let Some(option) = arg.strip_prefix("--") {
            pairs.push((option, Vec::new()));
        } else if let Some((_, words)) = pairs.last_mut() {
            words.push(arg);
        } else {
            return Err(CommandError::InvalidArgument(format!(
                "unexpected argument '{}'",
                arg
            )));
        }
    }

    pairs
        .into_iter()
        .map(|(option, words)| {
            if words.is_empty() {
                Err(CommandError::InvalidArgument(format!(
                    "option --{} needs a value",
                    option
                )))
            } else {
                Ok((option, words.join(" ")))
            }
        })
        .collect()
}

fn unknown_option(option: &str) -> CommandError {
    CommandError::InvalidArgument(format!("unknown option --{}", option))
}

fn parse_role(raw: &str) -> Result<Role, CommandError> {
    raw.parse().map_err(CommandError::InvalidArgument)
}

fn parse_id(value: Option<&str>) -> Result<RecordId, CommandError> {
    let raw = value.ok_or(CommandError::MissingArgument("id"))?;
    raw.parse()
        .map_err(|_| CommandError::InvalidArgument(format!("'{}' is not a valid id", raw)))
}

/// Run a command and render its output
pub async fn execute(state: &AppState, command: Command) -> Result<String, CommandError> {
    let output = match command {
        Command::Stats => {
            let stats = DashboardStats::collect(&state.keys, &state.users, &today());
            let mut out = format!(
                "keys: {} total, {} available, {} issued, {} lost\n\
                 issued today: {}\n\
                 users: {} active of {}",
                stats.keys.total,
                stats.keys.available,
                stats.keys.issued,
                stats.keys.lost,
                stats.issued_today,
                stats.active_users,
                stats.total_users,
            );
            for department in &stats.departments {
                let _ = write!(
                    out,
                    "\n  {}: {} keys, {} issued",
                    department.department, department.total, department.issued
                );
            }
            out
        }
        Command::Keys { status, search } => state
            .keys
            .filter(&search, status)
            .iter()
            .map(|key| render_key(key.as_ref()))
            .collect::<Vec<_>>()
            .join("\n"),
        Command::KeyAdd { office, department } => {
            render_key(&*state.keys.add(&office, &department)?)
        }
        Command::KeyIssue { id, recipient } => render_key(&*state.keys.issue(id, &recipient)?),
        Command::KeyReturn { id } => render_key(&*state.keys.return_key(id)?),
        Command::KeyLost { id } => render_key(&*state.keys.mark_lost(id)?),
        Command::KeyRecover { id } => render_key(&*state.keys.recover(id)?),
        Command::KeyDelete { id } => match state.keys.delete(id) {
            Some(key) => format!("deleted key {} (office {})", key.id, key.office),
            None => format!("no key {}", id),
        },
        Command::Users { role } => {
            let users = match role {
                Some(role) => state.users.find_by_role(role),
                None => state.users.list(),
            };
            users
                .iter()
                .map(|user| render_user(state, user))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::UserAdd { fields } => {
            require_editor(state)?;
            let user = state.users.create(fields)?;
            render_user(state, &user)
        }
        Command::UserUpdate { id, patch } => {
            require_editor(state)?;
            let user = state.users.update(id, patch)?;
            render_user(state, &user)
        }
        Command::UserDelete { id } => {
            require_editor(state)?;
            let user = state.users.delete(id).ok_or(UserError::NotFound(id))?;
            format!("deleted user {} ({})", user.id, user.name)
        }
        Command::Login {
            identifier,
            password,
            mode,
        } => {
            if state.session.login(&identifier, &password, mode) {
                match state.session.current_session() {
                    Some(user) => format!("signed in as {} ({})", user.name, user.role),
                    None => "signed in".to_string(),
                }
            } else if mode == LoginMode::Admin {
                "invalid administrator credentials".to_string()
            } else {
                "invalid login or password".to_string()
            }
        }
        Command::Logout => {
            state.session.logout();
            "signed out".to_string()
        }
        Command::Whoami => match state.session.current_session() {
            Some(user) => format!(
                "{} ({}), can edit users: {}",
                user.name,
                user.role,
                state.session.can_edit()
            ),
            None => "not signed in".to_string(),
        },
        Command::Scan { code } => match state.scanner.scan(&code).await {
            Some(result) => {
                let mut out = format!(
                    "{} [{}], {} key(s) issued",
                    result.user.name,
                    result.user.department,
                    result.keys_issued()
                );
                for key in &result.held_keys {
                    let _ = write!(
                        out,
                        "\n  office {} since {}",
                        key.office,
                        key.issued_at().unwrap_or("-")
                    );
                }
                out
            }
            None => format!("code \"{}\" not found", code.trim()),
        },
        Command::ResetPassword { email } => {
            if state.session.reset_password(&email) {
                "password reset instructions sent".to_string()
            } else {
                "no user with that email".to_string()
            }
        }
        Command::Save => {
            let keys = state.saver.save("keys", || state.keys.persist()).await?;
            let users = state.saver.save("users", || state.users.persist()).await?;
            info!(keys = state.keys.len(), users = state.users.len(), "All data saved");
            format!(
                "saved {} keys at {} and {} users at {}",
                state.keys.len(),
                keys.saved_at.format("%H:%M:%S"),
                state.users.len(),
                users.saved_at.format("%H:%M:%S")
            )
        }
        Command::Compact => match &state.log_store {
            Some(store) => format!("store compacted to {} records", store.compact()?),
            None => "in-memory store, nothing to compact".to_string(),
        },
    };

    Ok(output)
}

fn require_editor(state: &AppState) -> Result<(), CommandError> {
    if state.session.can_edit() {
        Ok(())
    } else {
        Err(CommandError::PermissionDenied(
            "editing users requires a manager or admin session",
        ))
    }
}

fn render_key(key: &KeyRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        key.id,
        key.office,
        key.department,
        key.status(),
        key.issued_to().unwrap_or("-"),
        key.issued_at().unwrap_or("-"),
        key.barcode.as_deref().unwrap_or("-"),
    )
}

fn render_user(state: &AppState, user: &User) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\tkeys: {}",
        user.id,
        user.name,
        user.email,
        user.department,
        user.role,
        user.status,
        state.keys.held_by(&user.name).len(),
    )
}
