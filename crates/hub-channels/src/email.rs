//! Email adapter — IMAP polling for inbound, SMTP (via `lettre`) for
//! outbound. `ImapClient` is a hand-rolled client speaking raw TCP + TLS
//! with only the commands a polling loop needs (LOGIN/SELECT/SEARCH/FETCH/
//! STORE/LOGOUT); no IMAP crate in the dependency stack fit a client this
//! thin.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use hub_core::bus::NormalizedMessage;
use hub_core::config::schema::EmailConfig;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::traits::{Channel, ConfigOverride};

const MIN_POLL_INTERVAL_SECS: u64 = 5;
const MAX_PROCESSED_UIDS: usize = 100_000;
const DEFAULT_SUBJECT_PREFIX: &str = "Re: ";
const IMAPS_PORT: u16 = 993;
const SMTP_SSL_PORT: u16 = 465;

#[derive(Debug, Clone)]
struct ParsedEmail {
    sender: String,
    subject: String,
    date: String,
    message_id: String,
    body: String,
}

trait ImapStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> ImapStream for T {}

/// Minimal async IMAP client: only what polling for unseen mail needs.
struct ImapClient {
    reader: tokio::io::BufReader<tokio::io::ReadHalf<Box<dyn ImapStream>>>,
    writer: tokio::io::WriteHalf<Box<dyn ImapStream>>,
    tag_counter: u32,
}

impl ImapClient {
    async fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        use tokio::io::BufReader;
        use tokio::net::TcpStream;

        let tcp = TcpStream::connect((host, port)).await?;

        let stream: Box<dyn ImapStream> = if port == IMAPS_PORT {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();
            let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|e| anyhow::anyhow!("invalid server name '{host}': {e}"))?;
            Box::new(connector.connect(server_name, tcp).await?)
        } else {
            Box::new(tcp)
        };

        let (read, write) = tokio::io::split(stream);
        let mut client = ImapClient {
            reader: BufReader::new(read),
            writer: write,
            tag_counter: 0,
        };

        let greeting = client.read_line().await?;
        if !greeting.to_uppercase().starts_with("* OK") {
            anyhow::bail!("unexpected IMAP greeting: {greeting}");
        }
        debug!(greeting = %greeting, "imap connected");
        Ok(client)
    }

    async fn read_line(&mut self) -> anyhow::Result<String> {
        use tokio::io::AsyncBufReadExt;
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            anyhow::bail!("IMAP connection closed unexpectedly");
        }
        Ok(line.trim_end_matches("\r\n").trim_end_matches('\n').to_string())
    }

    async fn read_exact(&mut self, n: usize) -> anyhow::Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn send_command(&mut self, cmd: &str) -> anyhow::Result<String> {
        use tokio::io::AsyncWriteExt;
        self.tag_counter += 1;
        let tag = format!("A{:04}", self.tag_counter);
        self.writer.write_all(format!("{tag} {cmd}\r\n").as_bytes()).await?;
        self.writer.flush().await?;
        Ok(tag)
    }

    async fn read_response(&mut self, tag: &str) -> anyhow::Result<(Vec<String>, String)> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.starts_with(tag) {
                return Ok((untagged, line));
            }
            untagged.push(line);
        }
    }

    async fn login(&mut self, user: &str, pass: &str) -> anyhow::Result<()> {
        let cmd = format!(
            "LOGIN \"{}\" \"{}\"",
            user.replace('\\', "\\\\").replace('"', "\\\""),
            pass.replace('\\', "\\\\").replace('"', "\\\""),
        );
        let tag = self.send_command(&cmd).await?;
        let (_, status) = self.read_response(&tag).await?;
        if !status.to_uppercase().contains("OK") {
            anyhow::bail!("IMAP LOGIN failed: {status}");
        }
        Ok(())
    }

    async fn select(&mut self, mailbox: &str) -> anyhow::Result<()> {
        let tag = self.send_command(&format!("SELECT \"{mailbox}\"")).await?;
        let (_, status) = self.read_response(&tag).await?;
        if !status.to_uppercase().contains("OK") {
            anyhow::bail!("IMAP SELECT failed: {status}");
        }
        Ok(())
    }

    async fn search_unseen(&mut self) -> anyhow::Result<Vec<u32>> {
        let tag = self.send_command("SEARCH UNSEEN").await?;
        let (lines, status) = self.read_response(&tag).await?;
        if !status.to_uppercase().contains("OK") {
            anyhow::bail!("IMAP SEARCH failed: {status}");
        }
        let mut seqnums = Vec::new();
        for line in &lines {
            if line.to_uppercase().starts_with("* SEARCH") {
                seqnums.extend(line.split_whitespace().skip(2).filter_map(|s| s.parse().ok()));
            }
        }
        Ok(seqnums)
    }

    async fn fetch_message(&mut self, seqnum: u32) -> anyhow::Result<(String, Vec<u8>)> {
        let cmd = format!("FETCH {seqnum} (UID BODY.PEEK[])");
        let tag = self.send_command(&cmd).await?;

        let mut uid = String::new();
        let mut email_data = Vec::new();

        loop {
            let line = self.read_line().await?;
            if line.starts_with(&tag) {
                if !line.to_uppercase().contains("OK") {
                    anyhow::bail!("IMAP FETCH failed: {line}");
                }
                break;
            }
            if line.starts_with("* ") && line.to_uppercase().contains("FETCH") {
                let upper = line.to_uppercase();
                if let Some(uid_pos) = upper.find("UID ") {
                    let rest = &line[uid_pos + 4..];
                    let uid_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                    uid = rest[..uid_end].to_string();
                }
                if let (Some(start), Some(end)) = (line.rfind('{'), line.rfind('}')) {
                    if end > start {
                        if let Ok(size) = line[start + 1..end].parse::<usize>() {
                            email_data = self.read_exact(size).await?;
                            let _ = self.read_line().await?;
                        }
                    }
                }
            }
        }
        Ok((uid, email_data))
    }

    async fn store_seen(&mut self, seqnum: u32) -> anyhow::Result<()> {
        let tag = self.send_command(&format!("STORE {seqnum} +FLAGS (\\Seen)")).await?;
        let (_, status) = self.read_response(&tag).await?;
        if !status.to_uppercase().contains("OK") {
            anyhow::bail!("IMAP STORE failed: {status}");
        }
        Ok(())
    }

    async fn logout(&mut self) -> anyhow::Result<()> {
        let tag = self.send_command("LOGOUT").await?;
        let _ = self.read_response(&tag).await;
        Ok(())
    }
}

pub struct EmailChannel {
    config: EmailConfig,
    allowed_senders: Vec<String>,
    processed_uids: Arc<Mutex<HashSet<String>>>,
    last_subject: Arc<RwLock<HashMap<String, String>>>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig, allowed_senders: Vec<String>) -> Self {
        EmailChannel {
            config,
            allowed_senders,
            processed_uids: Arc::new(Mutex::new(HashSet::new())),
            last_subject: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn is_allowed(&self, sender: &str) -> bool {
        if self.allowed_senders.is_empty() {
            return true;
        }
        let sender_lower = sender.to_lowercase();
        self.allowed_senders.iter().any(|u| u.to_lowercase() == sender_lower)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    fn extract_sender_email(from_header: &str) -> String {
        if let (Some(start), Some(end)) = (from_header.rfind('<'), from_header.rfind('>')) {
            if end > start {
                return from_header[start + 1..end].trim().to_lowercase();
            }
        }
        from_header.trim().to_lowercase()
    }

    fn html_to_text(html: &str) -> String {
        let mut text = regex::Regex::new(r"(?i)<br\s*/?>").unwrap().replace_all(html, "\n").to_string();
        text = regex::Regex::new(r"(?i)</p>").unwrap().replace_all(&text, "\n").to_string();
        text = regex::Regex::new(r"<[^>]+>").unwrap().replace_all(&text, "").to_string();
        text.replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&nbsp;", " ")
            .trim()
            .to_string()
    }

    fn truncate(s: &str, max: usize) -> String {
        if s.len() <= max {
            s.to_string()
        } else {
            s[..max].to_string()
        }
    }

    fn collect_text_parts(mail: &mailparse::ParsedMail, plain: &mut Vec<String>, html: &mut Vec<String>) {
        for part in &mail.subparts {
            if part.get_content_disposition().disposition == mailparse::DispositionType::Attachment {
                continue;
            }
            if !part.subparts.is_empty() {
                Self::collect_text_parts(part, plain, html);
            } else {
                let ct = part.ctype.mimetype.to_lowercase();
                if let Ok(body) = part.get_body() {
                    if ct.contains("text/plain") {
                        plain.push(body);
                    } else if ct.contains("text/html") {
                        html.push(body);
                    }
                }
            }
        }
    }

    fn extract_body(mail: &mailparse::ParsedMail, max_chars: usize) -> String {
        if mail.subparts.is_empty() {
            let ct = mail.ctype.mimetype.to_lowercase();
            let body = mail.get_body().unwrap_or_default();
            let result = if ct.contains("text/html") { Self::html_to_text(&body) } else { body };
            return Self::truncate(&result, max_chars);
        }

        let mut plain_parts = Vec::new();
        let mut html_parts = Vec::new();
        Self::collect_text_parts(mail, &mut plain_parts, &mut html_parts);

        let body = if !plain_parts.is_empty() {
            plain_parts.join("\n")
        } else if !html_parts.is_empty() {
            html_parts.iter().map(|h| Self::html_to_text(h)).collect::<Vec<_>>().join("\n")
        } else {
            String::new()
        };
        Self::truncate(&body, max_chars)
    }

    fn parse_email(raw: &[u8], max_body_chars: usize) -> Option<ParsedEmail> {
        let parsed = mailparse::parse_mail(raw).ok()?;
        let get_header = |name: &str| -> String {
            parsed
                .headers
                .iter()
                .find(|h| h.get_key().eq_ignore_ascii_case(name))
                .map(|h| h.get_value())
                .unwrap_or_default()
        };

        let sender = Self::extract_sender_email(&get_header("From"));
        let subject = get_header("Subject");
        let date = get_header("Date");
        let message_id = get_header("Message-ID");
        let body = Self::extract_body(&parsed, max_body_chars);

        Some(ParsedEmail { sender, subject, date, message_id, body })
    }

    fn build_reply_subject(original_subject: &str, prefix: &str) -> String {
        if original_subject.is_empty() {
            return format!("{prefix}(no subject)");
        }
        if original_subject.to_lowercase().starts_with("re:") {
            return original_subject.to_string();
        }
        format!("{prefix}{original_subject}")
    }

    /// Connect -> login -> select -> search unseen -> fetch/parse/dedup each
    /// -> publish as `NormalizedMessage`s -> mark seen -> logout.
    pub async fn poll_once(&self) -> anyhow::Result<Vec<NormalizedMessage>> {
        let mut imap = ImapClient::connect(&self.config.imap_host, self.config.imap_port).await?;
        imap.login(&self.config.imap_user, &self.config.imap_password).await?;
        imap.select("INBOX").await?;

        let seqnums = imap.search_unseen().await?;
        debug!(count = seqnums.len(), "email: found unseen messages");

        let mut out = Vec::new();
        for seqnum in seqnums {
            let (uid, raw) = match imap.fetch_message(seqnum).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(seqnum, error = %e, "email: failed to fetch message");
                    continue;
                }
            };

            {
                let mut uids = self.processed_uids.lock().await;
                if uids.contains(&uid) {
                    debug!(uid = %uid, "email: skipping already-processed uid");
                    continue;
                }
                if uids.len() >= MAX_PROCESSED_UIDS {
                    uids.clear();
                }
                uids.insert(uid.clone());
            }

            let Some(email) = Self::parse_email(&raw, self.config.max_body_chars) else {
                warn!(uid = %uid, "email: failed to parse message");
                continue;
            };

            if !self.is_allowed(&email.sender) {
                warn!(sender = %email.sender, "email: sender not in allow-list");
                continue;
            }

            {
                let mut subjects = self.last_subject.write().await;
                subjects.insert(email.sender.clone(), email.subject.clone());
            }

            let content = format!(
                "Email received.\nFrom: {}\nSubject: {}\nDate: {}\n\n{}",
                email.sender, email.subject, email.date, email.body
            );

            let mut metadata = HashMap::new();
            metadata.insert("subject".to_string(), email.subject.clone());
            metadata.insert("date".to_string(), email.date.clone());
            metadata.insert("uid".to_string(), uid.clone());

            let mut msg = NormalizedMessage::new("email", email.sender.clone(), email.sender.clone(), content);
            msg.provider_message_id = Some(email.message_id.clone());
            msg.metadata = metadata;
            out.push(msg);

            if let Err(e) = imap.store_seen(seqnum).await {
                warn!(seqnum, error = %e, "email: failed to mark message seen");
            }
        }

        if let Err(e) = imap.logout().await {
            debug!(error = %e, "email: imap logout error (non-fatal)");
        }
        Ok(out)
    }

    async fn send_email(&self, to: &str, content: &str, in_reply_to_subject: Option<&str>) -> anyhow::Result<()> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

        if self.config.smtp_host.is_empty() {
            anyhow::bail!("SMTP host not configured");
        }
        if to.is_empty() {
            anyhow::bail!("no recipient address");
        }

        let from_addr = if !self.config.smtp_user.is_empty() {
            self.config.smtp_user.clone()
        } else {
            self.config.imap_user.clone()
        };
        if from_addr.is_empty() {
            anyhow::bail!("no from address configured");
        }

        let subject = match in_reply_to_subject {
            Some(s) => Self::build_reply_subject(s, DEFAULT_SUBJECT_PREFIX),
            None => {
                let subjects = self.last_subject.read().await;
                let orig = subjects.get(to).cloned().unwrap_or_default();
                Self::build_reply_subject(&orig, DEFAULT_SUBJECT_PREFIX)
            }
        };

        let email = Message::builder()
            .from(from_addr.parse().map_err(|e| anyhow::anyhow!("invalid from address: {e}"))?)
            .to(to.parse().map_err(|e| anyhow::anyhow!("invalid to address: {e}"))?)
            .subject(&subject)
            .body(content.to_string())
            .map_err(|e| anyhow::anyhow!("failed to build email: {e}"))?;

        let creds = Credentials::new(self.config.smtp_user.clone(), self.config.smtp_password.clone());

        let transport = if self.config.smtp_port == SMTP_SSL_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| anyhow::anyhow!("SMTP relay error: {e}"))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| anyhow::anyhow!("SMTP STARTTLS error: {e}"))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build()
        };

        transport.send(email).await.map_err(|e| anyhow::anyhow!("SMTP send error: {e}"))?;
        info!(to = %to, subject = %subject, "email: sent");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        if self.config.imap_host.is_empty() || self.config.imap_user.is_empty() {
            warn!("email: imap not fully configured");
        }
        Ok(())
    }

    async fn send_message(
        &self,
        to: &str,
        message: &str,
        _config_override: Option<&ConfigOverride>,
    ) -> Result<(), ChannelError> {
        self.send_email(to, message, None)
            .await
            .map_err(|e| ChannelError::RequestFailed("email".into(), e.to_string()))
    }

    async fn receive_message(&self, payload: &Value) -> Result<NormalizedMessage, ChannelError> {
        let sender = payload.get("sender").and_then(Value::as_str).unwrap_or_default();
        let content = payload.get("content").and_then(Value::as_str).unwrap_or_default();
        if sender.is_empty() {
            return Err(ChannelError::UnknownPayload);
        }
        Ok(NormalizedMessage::new("email", sender, sender, content))
    }

    async fn handle_webhook(&self, _payload: &Value) -> Result<Option<NormalizedMessage>, ChannelError> {
        // Email has no webhook transport; inbound mail arrives through
        // the IMAP poll loop via `poll_once`, not this ingress path.
        Ok(None)
    }

    async fn is_healthy(&self) -> bool {
        !self.config.imap_host.is_empty() && !self.config.smtp_host.is_empty()
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sender_email_with_display_name() {
        assert_eq!(
            EmailChannel::extract_sender_email("\"User Name\" <user@example.com>"),
            "user@example.com"
        );
    }

    #[test]
    fn test_extract_sender_email_bare_address() {
        assert_eq!(EmailChannel::extract_sender_email("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_html_to_text_strips_tags_and_entities() {
        let text = EmailChannel::html_to_text("<p>Hi&nbsp;there</p><br>Bye");
        assert_eq!(text, "Hi there\n\nBye");
    }

    #[test]
    fn test_build_reply_subject_adds_prefix() {
        assert_eq!(EmailChannel::build_reply_subject("Hello", "Re: "), "Re: Hello");
    }

    #[test]
    fn test_build_reply_subject_keeps_existing_re() {
        assert_eq!(EmailChannel::build_reply_subject("Re: Hello", "Re: "), "Re: Hello");
    }

    #[test]
    fn test_build_reply_subject_empty() {
        assert_eq!(EmailChannel::build_reply_subject("", "Re: "), "Re: (no subject)");
    }

    #[test]
    fn test_is_allowed_empty_list() {
        let ch = EmailChannel::new(EmailConfig::default(), vec![]);
        assert!(ch.is_allowed("anyone@example.com"));
    }

    #[test]
    fn test_is_allowed_case_insensitive() {
        let ch = EmailChannel::new(EmailConfig::default(), vec!["Alice@Example.com".into()]);
        assert!(ch.is_allowed("alice@example.com"));
    }

    #[test]
    fn test_poll_interval_floors_at_minimum() {
        let mut config = EmailConfig::default();
        config.poll_interval_secs = 1;
        let ch = EmailChannel::new(config, vec![]);
        assert_eq!(ch.poll_interval(), Duration::from_secs(MIN_POLL_INTERVAL_SECS));
    }
}
