//! Operator console.
//!
//! Two layers:
//! - [`Console`]: console variables (cvars), a few generic built-ins (`echo`,
//!   `help`, `cvarlist`, `set`) and a bounded history.
//! - [`WorldCommand`]: the typed commands that act on the tile world. The host
//!   parses these first and only hands unknown lines to the console.
//!
//! ```ignore
//! let mut console = Console::new();
//! console.register_cvar("tw_transparent_black", CvarValue::Bool(true), "...", CvarFlags::ARCHIVE);
//! match WorldCommand::parse(line)? {
//!     Some(cmd) => world_host.apply(cmd),
//!     None => console.exec(line)?,
//! }
//! ```

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{bail, Context};

use crate::tile::TileCoord;

/// Console variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum CvarValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl CvarValue {
    /// Parses operator input: int, then float, then bool, then string.
    pub fn parse(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            CvarValue::Int(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            CvarValue::Float(v)
        } else if raw == "true" {
            CvarValue::Bool(true)
        } else if raw == "false" {
            CvarValue::Bool(false)
        } else {
            CvarValue::String(raw.trim_matches('"').to_string())
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CvarValue::Int(v) => Some(*v),
            CvarValue::Float(v) => Some(*v as i64),
            CvarValue::Bool(v) => Some(i64::from(*v)),
            CvarValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            CvarValue::Bool(v) => *v,
            CvarValue::Int(v) => *v != 0,
            CvarValue::Float(v) => *v != 0.0,
            CvarValue::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            CvarValue::String(s) => s.clone(),
            CvarValue::Int(v) => v.to_string(),
            CvarValue::Float(v) => v.to_string(),
            CvarValue::Bool(v) => v.to_string(),
        }
    }
}

impl fmt::Display for CvarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CvarValue::Int(v) => write!(f, "{v}"),
            CvarValue::Float(v) => write!(f, "{v}"),
            CvarValue::String(v) => write!(f, "\"{v}\""),
            CvarValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

bitflags::bitflags! {
    /// Cvar flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        /// Written back to the config file.
        const ARCHIVE = 1 << 0;
        /// Only read at startup; `set` is refused.
        const READ_ONLY = 1 << 1;
    }
}

/// Console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub value: CvarValue,
    pub default: CvarValue,
    pub description: String,
    pub flags: CvarFlags,
}

type Cvars = Arc<RwLock<HashMap<String, Cvar>>>;

/// Command handler function type.
pub type CommandHandler = Box<dyn Fn(&[&str], &mut ConsoleContext) -> anyhow::Result<()> + Send + Sync>;

/// Context passed to command handlers.
pub struct ConsoleContext {
    /// Output lines for the operator.
    pub output: Vec<String>,
    cvars: Cvars,
}

impl ConsoleContext {
    pub fn print(&mut self, msg: impl Into<String>) {
        self.output.push(msg.into());
    }

    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        get_cvar(&self.cvars, name)
    }

    pub fn set_cvar(&self, name: &str, value: CvarValue) -> anyhow::Result<()> {
        set_cvar(&self.cvars, name, value)
    }
}

fn get_cvar(cvars: &Cvars, name: &str) -> Option<CvarValue> {
    cvars
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .map(|c| c.value.clone())
}

fn set_cvar(cvars: &Cvars, name: &str, value: CvarValue) -> anyhow::Result<()> {
    let mut cvars = cvars.write().unwrap_or_else(PoisonError::into_inner);
    let Some(cvar) = cvars.get_mut(name) else {
        bail!("unknown cvar: {name}");
    };
    if cvar.flags.contains(CvarFlags::READ_ONLY) {
        bail!("cvar {name} is read-only");
    }
    cvar.value = value;
    Ok(())
}

const MAX_HISTORY: usize = 100;

/// The console.
pub struct Console {
    cvars: Cvars,
    commands: HashMap<String, CommandHandler>,
    history: VecDeque<String>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let mut console = Self {
            cvars: Arc::new(RwLock::new(HashMap::new())),
            commands: HashMap::new(),
            history: VecDeque::new(),
        };
        console.register_builtin_commands();
        console
    }

    fn register_builtin_commands(&mut self) {
        self.register_command("echo", |args, ctx| {
            ctx.print(args.join(" "));
            Ok(())
        });

        self.register_command("help", |_args, ctx| {
            ctx.print(format!("World commands: {}", WorldCommand::USAGE));
            ctx.print("Console commands: echo, help, cvarlist, set <cvar> <value>");
            Ok(())
        });

        self.register_command("cvarlist", |_args, ctx| {
            let mut lines: Vec<String> = ctx
                .cvars
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(name, cvar)| format!("  {name} = {} (default: {}) {}", cvar.value, cvar.default, cvar.description))
                .collect();
            lines.sort();
            for line in lines {
                ctx.print(line);
            }
            Ok(())
        });

        self.register_command("set", |args, ctx| {
            if args.len() < 2 {
                bail!("usage: set <cvar> <value>");
            }
            let name = args[0];
            let value = CvarValue::parse(&args[1..].join(" "));
            ctx.set_cvar(name, value.clone())?;
            ctx.print(format!("{name} = {value}"));
            Ok(())
        });
    }

    /// Registers a console variable.
    pub fn register_cvar(&mut self, name: &str, default: CvarValue, description: &str, flags: CvarFlags) {
        let cvar = Cvar {
            value: default.clone(),
            default,
            description: description.to_string(),
            flags,
        };
        self.cvars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), cvar);
    }

    /// Registers a command.
    pub fn register_command<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str], &mut ConsoleContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    /// Executes a console command line.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(Vec::new());
        }

        self.history.push_back(line.to_string());
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        let tokens = tokenize(line);
        let Some((cmd_name, rest)) = tokens.split_first() else {
            return Ok(Vec::new());
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        let mut ctx = ConsoleContext {
            output: Vec::new(),
            cvars: Arc::clone(&self.cvars),
        };

        if let Some(handler) = self.commands.get(cmd_name.as_str()) {
            handler(&args, &mut ctx).with_context(|| format!("command '{cmd_name}'"))?;
            return Ok(ctx.output);
        }

        // A bare cvar name queries it; a name with a value sets it.
        let cvar = self
            .cvars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cmd_name.as_str())
            .map(|c| (c.value.clone(), c.default.clone()));
        match cvar {
            Some((value, default)) if args.is_empty() => {
                ctx.print(format!("{cmd_name} = {value} (default: {default})"));
            }
            Some(_) => {
                let value = CvarValue::parse(&args.join(" "));
                ctx.set_cvar(cmd_name, value.clone())?;
                ctx.print(format!("{cmd_name} = {value}"));
            }
            None => ctx.print(format!("Unknown command: {cmd_name}")),
        }
        Ok(ctx.output)
    }

    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        get_cvar(&self.cvars, name)
    }

    pub fn set_cvar(&self, name: &str, value: CvarValue) -> anyhow::Result<()> {
        set_cvar(&self.cvars, name, value)
    }

    /// Executed lines, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }
}

/// Commands that act on the tile world.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    /// Loads `<maps_dir>/<name>.lvl` and queues its tiles.
    Map(String),
    /// Requests a live tile covering `(x, z)`.
    TileAdd { x: f64, z: f64 },
    /// Requests removal of the tile covering `(x, z)`.
    TileRemove { x: f64, z: f64 },
    /// Lists occupied cardinal neighbours of the cell covering `(x, z)`.
    Neighbors { x: f64, z: f64 },
    /// Prints the arena centre for `(x, z)`.
    Arena { x: f64, z: f64 },
    Status,
    Quit,
}

impl WorldCommand {
    pub const USAGE: &'static str =
        "map <name>, tile_add <x> <z>, tile_remove <x> <z>, neighbors <x> <z>, arena <x> <z>, status, quit";

    /// Parses a world command. Returns `Ok(None)` for lines that are not world
    /// commands, and an error for world commands with bad arguments.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let tokens = tokenize(line.trim());
        let Some((name, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let cmd = match name.as_str() {
            "map" => match args {
                [map] => WorldCommand::Map(map.clone()),
                _ => bail!("usage: map <name>"),
            },
            "tile_add" => {
                let (x, z) = parse_xz(name, args)?;
                WorldCommand::TileAdd { x, z }
            }
            "tile_remove" => {
                let (x, z) = parse_xz(name, args)?;
                WorldCommand::TileRemove { x, z }
            }
            "neighbors" => {
                let (x, z) = parse_xz(name, args)?;
                WorldCommand::Neighbors { x, z }
            }
            "arena" => {
                let (x, z) = parse_xz(name, args)?;
                WorldCommand::Arena { x, z }
            }
            "status" => WorldCommand::Status,
            "quit" | "exit" => WorldCommand::Quit,
            _ => return Ok(None),
        };
        Ok(Some(cmd))
    }
}

fn parse_xz(name: &str, args: &[String]) -> anyhow::Result<(f64, f64)> {
    let [x, z] = args else {
        bail!("usage: {name} <x> <z>");
    };
    let x = x.parse().with_context(|| format!("{name}: bad x '{x}'"))?;
    let z = z.parse().with_context(|| format!("{name}: bad z '{z}'"))?;
    TileCoord::try_clamp(x, z).with_context(|| format!("{name}: bad position"))?;
    Ok((x, z))
}

/// Splits a command line into tokens, respecting quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
