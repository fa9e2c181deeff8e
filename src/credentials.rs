//! Messaging credentials and their on-disk store.
//!
//! The store is a java-properties style text file with two keys, `token` and
//! `chatId`. When the file is missing the operator is prompted once and the
//! answers are persisted for later runs. Any failure to read, parse or write the
//! file is fatal: the sentinel must not arm without a working alert path.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const DEFAULT_CREDENTIALS_PATH: &str = "telegram.properties";

const TOKEN_KEY: &str = "token";
const CHAT_ID_KEY: &str = "chatId";
const FILE_HEADER: &str = "# Telegram credentials for motion-sentinel";

/// Bot token and destination chat. Read-only once loaded.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl Credentials {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// File-backed credential store.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIALS_PATH)
    }
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load credentials, prompting on the terminal if none are stored yet.
    pub fn load(&self) -> Result<Credentials> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.load_with(stdin.lock(), stdout.lock())
    }

    /// Same as `load`, with explicit prompt streams.
    pub fn load_with<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<Credentials> {
        if self.exists() {
            return self.read_existing();
        }
        let creds = prompt_credentials(input, output)?;
        self.persist(&creds)?;
        println!("{} created.", self.path.display());
        Ok(creds)
    }

    pub fn read_existing(&self) -> Result<Credentials> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| anyhow!("failed to read {}: {}", self.path.display(), e))?;
        let mut props = parse_properties(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        let mut take = |key: &str| -> Result<String> {
            match props.remove(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                Some(_) => Err(anyhow!("{} has an empty '{}' entry", self.path.display(), key)),
                None => Err(anyhow!("{} is missing '{}'", self.path.display(), key)),
            }
        };
        let bot_token = take(TOKEN_KEY)?;
        let chat_id = take(CHAT_ID_KEY)?;
        props.values_mut().for_each(|v| v.zeroize());
        Ok(Credentials { bot_token, chat_id })
    }

    pub fn persist(&self, creds: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    anyhow!(
                        "failed to create credentials directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut contents = format_properties(&[
            (TOKEN_KEY, creds.bot_token.as_str()),
            (CHAT_ID_KEY, creds.chat_id.as_str()),
        ]);
        let written = options.open(&self.path).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
        contents.zeroize();
        written.map_err(|e| anyhow!("failed to write {}: {}", self.path.display(), e))?;
        log::info!("credentials stored in {}", self.path.display());
        Ok(())
    }
}

fn prompt_credentials<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<Credentials> {
    let bot_token = prompt_line(&mut input, &mut output, "Enter TELEGRAM BOT TOKEN: ")?;
    let chat_id = prompt_line(&mut input, &mut output, "Enter TELEGRAM CHAT ID: ")?;
    Ok(Credentials { bot_token, chat_id })
}

fn prompt_line<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<String> {
    output.write_all(prompt.as_bytes())?;
    output.flush()?;
    let mut line = String::new();
    let read = input.read_line(&mut line).context("read prompt answer")?;
    if read == 0 {
        return Err(anyhow!("input closed while waiting for '{}'", prompt.trim()));
    }
    let answer = line.trim().to_string();
    line.zeroize();
    if answer.is_empty() {
        return Err(anyhow!("'{}' must not be empty", prompt.trim()));
    }
    Ok(answer)
}

// ----------------------------------------------------------------------------
// Properties format
// ----------------------------------------------------------------------------

/// Parse java-properties text into a key/value map.
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, trailing
/// backslash line continuation and the standard backslash escapes.
pub(crate) fn parse_properties(text: &str) -> Result<BTreeMap<String, String>> {
    let mut props = BTreeMap::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let mut logical = line.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }
        let (key, value) = split_entry(&logical);
        props.insert(unescape(key)?, unescape(value)?);
        logical.zeroize();
    }
    Ok(props)
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }
    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\u{c}']);
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    (key, rest.trim_start_matches([' ', '\t', '\u{c}']))
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| anyhow!("malformed \\uxxxx escape '\\u{}'", hex))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (idx, c) in value.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' ' if idx == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn format_properties(entries: &[(&str, &str)]) -> String {
    let mut out = String::from(FILE_HEADER);
    out.push('\n');
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(&escape_value(value));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn parses_java_written_file() -> Result<()> {
        let text = "#Telegram credentials for Mini-Guard\n\
                    #Tue Jan 02 21:14:00 CET 2024\n\
                    chatId=-100123\n\
                    token=123456\\:AAE-xyz_\n";
        let props = parse_properties(text)?;
        assert_eq!(props["token"], "123456:AAE-xyz_");
        assert_eq!(props["chatId"], "-100123");
        Ok(())
    }

    #[test]
    fn parses_separators_and_continuations() -> Result<()> {
        let text = "  ! comment\n\
                    a : one\n\
                    b two\n\
                    c=multi\\\n    line\n\
                    d=\\u0041\\tz\n";
        let props = parse_properties(text)?;
        assert_eq!(props["a"], "one");
        assert_eq!(props["b"], "two");
        assert_eq!(props["c"], "multiline");
        assert_eq!(props["d"], "A\tz");
        Ok(())
    }

    #[test]
    fn malformed_unicode_escape_is_an_error() {
        assert!(parse_properties("token=\\u12\n").is_err());
    }

    #[test]
    fn format_then_parse_preserves_awkward_values() -> Result<()> {
        let text = format_properties(&[("token", "a\\b:c=d"), ("chatId", " 42")]);
        let props = parse_properties(&text)?;
        assert_eq!(props["token"], "a\\b:c=d");
        assert_eq!(props["chatId"], " 42");
        Ok(())
    }

    #[test]
    fn first_run_prompts_and_persists() -> Result<()> {
        let dir = tempdir()?;
        let store = CredentialStore::new(dir.path().join("nested").join("telegram.properties"));
        let mut prompts = Vec::new();

        let creds = store.load_with(Cursor::new("  123:abc \n 42\n"), &mut prompts)?;

        assert_eq!(creds, Credentials::new("123:abc", "42"));
        let shown = String::from_utf8(prompts)?;
        assert!(shown.contains("Enter TELEGRAM BOT TOKEN: "));
        assert!(shown.contains("Enter TELEGRAM CHAT ID: "));
        assert!(store.exists());
        assert_eq!(store.read_existing()?, creds);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn persisted_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir()?;
        let store = CredentialStore::new(dir.path().join("telegram.properties"));
        store.persist(&Credentials::new("t", "c"))?;
        let mode = fs::metadata(store.path())?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn existing_store_never_prompts() -> Result<()> {
        let dir = tempdir()?;
        let store = CredentialStore::new(dir.path().join("telegram.properties"));
        store.persist(&Credentials::new("123:abc", "42"))?;

        let mut prompts = Vec::new();
        let first = store.load_with(Cursor::new(""), &mut prompts)?;
        let second = store.load_with(Cursor::new(""), &mut prompts)?;

        assert_eq!(first, second);
        assert!(prompts.is_empty());
        Ok(())
    }

    #[test]
    fn missing_key_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("telegram.properties");
        fs::write(&path, "token=abc\n")?;
        let err = CredentialStore::new(&path).read_existing().unwrap_err();
        assert!(err.to_string().contains("chatId"));
        Ok(())
    }

    #[test]
    fn closed_input_is_fatal_and_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let store = CredentialStore::new(dir.path().join("telegram.properties"));
        assert!(store.load_with(Cursor::new("only-token\n"), Vec::new()).is_err());
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn unwritable_location_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x")?;
        let store = CredentialStore::new(blocker.join("telegram.properties"));
        assert!(store.load_with(Cursor::new("t\nc\n"), Vec::new()).is_err());
        Ok(())
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", Credentials::new("secret-token", "42"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("42"));
    }
}
