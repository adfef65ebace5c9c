use hermetic_config::Redacted;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped in the user and password parts of a connection URL.
const USERINFO_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// How to reach a running ephemeral database.
///
/// `Debug` output never includes the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Redacted<String>,
}

impl ConnectionInfo {
    /// A `postgres://` URL with user, password and database name percent-encoded.
    ///
    /// The URL embeds the password; wrap it in [`Redacted`] before logging.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.user, USERINFO_ENCODE_SET),
            utf8_percent_encode(&self.password, USERINFO_ENCODE_SET),
            self.host,
            self.port,
            utf8_percent_encode(&self.database, USERINFO_ENCODE_SET),
        )
    }
}
