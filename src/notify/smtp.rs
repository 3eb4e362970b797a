//! Minimal SMTP submission over a plain TCP connection
//!
//! Speaks just enough SMTP to hand one message to a relay or MX host:
//! EHLO, MAIL FROM, RCPT TO, DATA and QUIT, checking every reply code.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::NotifyConfig;
use crate::notify::{EmailMessage, Notifier, NotifyError, NotifyResult};

const DISPLAY_NAME: &str = "Production Analytics";

pub struct SmtpNotifier {
    host: String,
    port: u16,
    helo_name: String,
    timeout: Duration,
}

impl SmtpNotifier {
    pub fn new(host: impl Into<String>, port: u16, helo_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            helo_name: helo_name.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(&config.smtp_host, config.smtp_port, &config.helo_name)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn deliver(&self, message: &EmailMessage) -> NotifyResult<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect(&mut reader, "greeting", 220).await?;

        command(&mut writer, &format!("EHLO {}", self.helo_name)).await?;
        expect(&mut reader, "EHLO", 250).await?;

        command(&mut writer, &format!("MAIL FROM:<{}>", message.from)).await?;
        expect(&mut reader, "MAIL FROM", 250).await?;

        command(&mut writer, &format!("RCPT TO:<{}>", message.to)).await?;
        expect_any(&mut reader, "RCPT TO", &[250, 251]).await?;

        command(&mut writer, "DATA").await?;
        expect(&mut reader, "DATA", 354).await?;

        writer
            .write_all(dot_stuff(&message.to_rfc5322(DISPLAY_NAME)).as_bytes())
            .await?;
        writer.write_all(b".\r\n").await?;
        writer.flush().await?;
        expect(&mut reader, "message body", 250).await?;

        command(&mut writer, "QUIT").await?;
        // Some servers drop the connection without a 221; the message is already accepted.
        let _ = read_reply(&mut reader).await;

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &EmailMessage) -> NotifyResult<()> {
        debug!("Sending summary email via {}:{}", self.host, self.port);
        tokio::time::timeout(self.timeout, self.deliver(message))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout.as_secs()))??;

        info!("Emailed summary '{}' to {}", message.subject, message.to);
        Ok(())
    }
}

async fn command<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> NotifyResult<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one (possibly multi-line) reply, returning its code and text
async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> NotifyResult<(u16, String)> {
    let mut text = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(NotifyError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "SMTP server closed the connection",
            )));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let code = line
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| NotifyError::MalformedReply(line.to_string()))?;
        text.push(line.get(4..).unwrap_or("").to_string());

        // "250-..." continues, "250 ..." (or a bare "250") ends the reply
        if line.as_bytes().get(3) != Some(&b'-') {
            return Ok((code, text.join("\n")));
        }
    }
}

async fn expect<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    command: &'static str,
    code: u16,
) -> NotifyResult<()> {
    expect_any(reader, command, &[code]).await
}

async fn expect_any<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    command: &'static str,
    codes: &[u16],
) -> NotifyResult<()> {
    let (code, message) = read_reply(reader).await?;
    if codes.contains(&code) {
        Ok(())
    } else {
        Err(NotifyError::Rejected {
            command,
            code,
            message,
        })
    }
}

/// Escape lines starting with '.' so they can't end the DATA section early
fn dot_stuff(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for line in text.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out
}
