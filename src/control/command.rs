use tracing::debug;

use crate::constants::CRLF;
use crate::error::GatewayResult;
use crate::settings::{Label, Settings};
use crate::store::{PersistentRegion, SettingsStore};
use crate::util::lenient_parse_int;

pub const HELP_TEXT: &str = "Available commands:\r\n\
? - get <label>,<baudrate>,<parity>,<wordlength>,<stopbits>\r\n\
label [string] - get or set custom label for this box (up to 63 characters)\r\n\
baudrate [value] - get or set baudrate \
(300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 28800, 38400, 57600, 115200)\r\n\
parity [value] - get or set parity (N, E, O)\r\n\
wordlength [value] - get or set wordlength (5, 6, 7, 8)\r\n\
stopbits [value] - get or set stopbits (1, 2)\r\n\
save - saves current settings to persistent memory\r\n\
load - loads settings from persistent memory\r\n";

/// Control channel commands, in the order they are tested against a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Save,
    Load,
    Query,
    Label,
    Baudrate,
    Parity,
    Wordlength,
    Stopbits,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Help,
        Command::Save,
        Command::Load,
        Command::Query,
        Command::Label,
        Command::Baudrate,
        Command::Parity,
        Command::Wordlength,
        Command::Stopbits,
    ];

    pub fn keyword(self) -> &'static [u8] {
        match self {
            Command::Help => b"help",
            Command::Save => b"save",
            Command::Load => b"load",
            Command::Query => b"?",
            Command::Label => b"label",
            Command::Baudrate => b"baudrate",
            Command::Parity => b"parity",
            Command::Wordlength => b"wordlength",
            Command::Stopbits => b"stopbits",
        }
    }

    /// Getter/setter commands match on prefix, the rest only on the whole line
    pub fn takes_argument(self) -> bool {
        matches!(
            self,
            Command::Label
                | Command::Baudrate
                | Command::Parity
                | Command::Wordlength
                | Command::Stopbits
        )
    }

    pub fn matches(self, line: &[u8]) -> bool {
        if self.takes_argument() {
            line.starts_with(self.keyword())
        } else {
            line == self.keyword()
        }
    }

    /// The argument starts one byte past the keyword, whatever that byte is.
    /// A line no longer than that has no argument.
    pub fn argument(self, line: &[u8]) -> Option<&[u8]> {
        let start = self.keyword().len() + 1;
        if line.len() > start {
            Some(&line[start..])
        } else {
            None
        }
    }
}

/// Run one control line against the live settings, appending replies to
/// `out`. Returns whether the live settings changed and the serial line has
/// to be reopened.
///
/// Every command is tested against the line; matching does not stop at the
/// first hit.
pub fn execute<R: PersistentRegion>(
    line: &[u8],
    settings: &mut Settings,
    store: &mut SettingsStore<R>,
    out: &mut Vec<u8>,
) -> GatewayResult<bool> {
    debug!("Received control command: {}", String::from_utf8_lossy(line));

    let mut changed = false;
    for command in Command::ALL {
        if command.matches(line) {
            changed |= apply(command, line, settings, store, out)?;
        }
    }
    Ok(changed)
}

fn apply<R: PersistentRegion>(
    command: Command,
    line: &[u8],
    settings: &mut Settings,
    store: &mut SettingsStore<R>,
    out: &mut Vec<u8>,
) -> GatewayResult<bool> {
    let arg = command.argument(line);
    let mut changed = false;

    match command {
        Command::Help => out.extend_from_slice(HELP_TEXT.as_bytes()),
        Command::Save => {
            store.save(settings)?;
            reply(out, b"Saved!");
        }
        Command::Load => {
            *settings = store.load()?;
            reply(out, b"Loaded!");
            changed = true;
        }
        Command::Query => reply(out, &settings.to_csv()),
        Command::Label => {
            if let Some(text) = arg {
                settings.label = Label::new(text);
                changed = true;
            }
            reply(out, settings.label.as_bytes());
        }
        Command::Baudrate => {
            if let Some(value) = arg {
                settings.baudrate = lenient_parse_int(value);
                changed = true;
            }
            reply(out, settings.baudrate.to_string().as_bytes());
        }
        Command::Parity => {
            if let Some(value) = arg {
                settings.parity = value[0];
                changed = true;
            }
            reply(out, &[settings.parity]);
        }
        Command::Wordlength => {
            if let Some(value) = arg {
                settings.wordlength = lenient_parse_int(value);
                changed = true;
            }
            reply(out, settings.wordlength.to_string().as_bytes());
        }
        Command::Stopbits => {
            if let Some(value) = arg {
                settings.stopbits = lenient_parse_int(value);
                changed = true;
            }
            reply(out, settings.stopbits.to_string().as_bytes());
        }
    }

    Ok(changed)
}

pub(crate) fn reply(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    out.extend_from_slice(CRLF);
}
