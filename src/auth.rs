use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::data::SessionToken;
use crate::debug::debug_log;

pub const INSTRUCTIONS: &str = "Follow these steps and then run this command again:\n\
1. Open Google Chrome and right click the page and select Inspect Element.\n\
2. Go to https://www.youtube.com/, log in if you don't have.\n\
3. In Networks tab, click Documents and right click the first item in the \n   \
list and click Copy as cURL.";

const COOKIE_NAMES: [&str; 4] = ["SID", "HSID", "SSID", "LOGIN_INFO"];

static COOKIE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(SID|HSID|SSID|LOGIN_INFO)=(.+?);").expect("valid cookie regex")
});

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{0}")]
    NeedsManualStep(&'static str),
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the session token the feed requests are authenticated with.
pub trait CredentialProvider {
    fn session_token(&mut self) -> Result<SessionToken, CredentialError>;
}

/// Where a copied cURL command can be read from.
pub trait ClipboardSource {
    fn read_text(&mut self) -> Result<String>;
}

pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Result<String> {
        let mut clipboard = arboard::Clipboard::new().context("open clipboard")?;
        clipboard.get_text().context("read clipboard text")
    }
}

/// The four session cookies, persisted as a small JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar(BTreeMap<String, String>);

impl CookieJar {
    fn is_complete(&self) -> bool {
        COOKIE_NAMES
            .iter()
            .all(|name| self.0.get(*name).is_some_and(|value| !value.is_empty()))
    }

    pub fn header_value(&self) -> String {
        COOKIE_NAMES
            .iter()
            .filter_map(|name| self.0.get(*name).map(|value| format!("{name}={value}")))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Pulls the session cookies out of a copied cURL command. Requires
    /// exactly four matches, like the browser copy produces.
    pub fn from_curl(text: &str) -> Option<Self> {
        let captures: Vec<_> = COOKIE_RE.captures_iter(text).collect();
        if captures.len() != COOKIE_NAMES.len() {
            return None;
        }
        let jar = CookieJar(
            captures
                .iter()
                .map(|cap| (cap[1].to_string(), cap[2].to_string()))
                .collect(),
        );
        jar.is_complete().then_some(jar)
    }
}

/// Reads the cookie file, importing from the clipboard when it is missing or
/// incomplete. The file is consulted a second time after an import; if that
/// still fails the user has to act, so the fixed instructions are returned.
pub struct CookieCredentialProvider<C> {
    path: PathBuf,
    clipboard: C,
}

impl<C: ClipboardSource> CookieCredentialProvider<C> {
    pub fn new(path: PathBuf, clipboard: C) -> Self {
        Self { path, clipboard }
    }

    fn read_jar(&self) -> Option<CookieJar> {
        let data = fs::read_to_string(&self.path).ok()?;
        let jar: CookieJar = serde_json::from_str(&data).ok()?;
        jar.is_complete().then_some(jar)
    }

    fn import_from_clipboard(&mut self) -> Result<bool, CredentialError> {
        let text = match self.clipboard.read_text() {
            Ok(text) => text,
            Err(err) => {
                debug_log(format!("auth: clipboard unavailable: {err:#}"));
                return Ok(false);
            }
        };
        let Some(jar) = CookieJar::from_curl(&text) else {
            return Ok(false);
        };
        write_private(&self.path, &jar)
            .map_err(|err| CredentialError::Unavailable(format!("{err:#}")))?;
        debug_log(format!("auth: imported cookies into {}", self.path.display()));
        Ok(true)
    }
}

impl<C: ClipboardSource> CredentialProvider for CookieCredentialProvider<C> {
    fn session_token(&mut self) -> Result<SessionToken, CredentialError> {
        if let Some(jar) = self.read_jar() {
            return Ok(SessionToken::new(jar.header_value()));
        }
        if !self.import_from_clipboard()? {
            return Err(CredentialError::NeedsManualStep(INSTRUCTIONS));
        }
        self.read_jar()
            .map(|jar| SessionToken::new(jar.header_value()))
            .ok_or(CredentialError::NeedsManualStep(INSTRUCTIONS))
    }
}

fn write_private(path: &Path, jar: &CookieJar) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("auth: create directory {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(jar).context("auth: serialize cookies")?;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("auth: open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("auth: write {}", path.display()))?;
    Ok(())
}

pub fn default_cookie_path() -> Option<PathBuf> {
    crate::config::config_dir().map(|dir| dir.join("cookie.json"))
}
