//! Alert construction and best-effort delivery.
//!
//! Every motion decision produces one `AlertEvent` and exactly one delivery
//! attempt. Transport failures are logged and reported as `DispatchOutcome::Failed`;
//! they never reach the sentinel loop as errors.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use crate::credentials::Credentials;
use crate::motion::MotionScore;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// A motion decision with its human-readable text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertEvent {
    pub score: MotionScore,
    pub message: String,
}

impl AlertEvent {
    pub fn motion(score: MotionScore) -> Self {
        Self {
            score,
            message: format!("⚠️ Motion detected! ({} px)", score),
        }
    }
}

/// Outbound messaging transport.
pub trait Notifier {
    fn send(&self, credentials: &Credentials, text: &str) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Telegram Bot API transport
// ----------------------------------------------------------------------------

/// Sends alerts with the Bot API `sendMessage` method over HTTPS GET.
pub struct TelegramNotifier {
    api_base: Url,
    agent: ureq::Agent,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let api_base = Url::parse(api_base).context("parse telegram api base url")?;
        if api_base.cannot_be_a_base() {
            return Err(anyhow!("telegram api base '{}' cannot be a base url", api_base));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { api_base, agent })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, credentials: &Credentials, text: &str) -> Result<()> {
        let url = send_message_url(&self.api_base, credentials, text)?;
        match self.agent.request_url("GET", &url).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => Err(anyhow!(
                "telegram responded {} {}",
                code,
                response.status_text()
            )),
            // Transport errors carry the request url, which embeds the bot token.
            Err(ureq::Error::Transport(transport)) => Err(anyhow!(
                "telegram request failed: {}",
                transport.kind()
            )),
        }
    }
}

/// `{base}/bot{token}/sendMessage?chat_id={chat}&text={text}`, with every part encoded.
pub fn send_message_url(api_base: &Url, credentials: &Credentials, text: &str) -> Result<Url> {
    let mut url = api_base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| anyhow!("telegram api base '{}' cannot be a base url", api_base))?
        .pop_if_empty()
        .push(&format!("bot{}", credentials.bot_token))
        .push("sendMessage");
    url.query_pairs_mut()
        .append_pair("chat_id", &credentials.chat_id)
        .append_pair("text", text);
    Ok(url)
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Hands alert events to a notifier and absorbs its failures.
pub struct AlertDispatcher<N> {
    notifier: N,
}

impl<N: Notifier> AlertDispatcher<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn dispatch(&self, event: &AlertEvent, credentials: &Credentials) -> DispatchOutcome {
        match self.notifier.send(credentials, &event.message) {
            Ok(()) => {
                log::debug!("alert delivered (score={})", event.score);
                DispatchOutcome::Delivered
            }
            Err(err) => {
                log::error!("alert delivery failed (score={}): {:#}", event.score, err);
                DispatchOutcome::Failed(format!("{:#}", err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    struct Recording {
        sent: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Notifier for Recording {
        fn send(&self, _credentials: &Credentials, text: &str) -> Result<()> {
            self.sent.borrow_mut().push(text.to_string());
            if self.fail {
                Err(anyhow!("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    fn creds() -> Credentials {
        Credentials::new("123456:ABC-def", "-100987")
    }

    /// Answer exactly one HTTP request with `status`; yields the request line.
    fn serve_once(status: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 0 && header != "\r\n" {
                header.clear();
            }
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                status
            )
            .unwrap();
            request_line.trim_end().to_string()
        });
        (base, handle)
    }

    #[test]
    fn motion_message_contains_score() {
        let event = AlertEvent::motion(MotionScore(6123));
        assert_eq!(event.message, "⚠️ Motion detected! (6123 px)");
    }

    #[test]
    fn send_message_url_encodes_text() -> Result<()> {
        let base = Url::parse(DEFAULT_API_BASE)?;
        let url = send_message_url(&base, &creds(), "⚠️ Motion detected! (6000 px)")?;
        assert_eq!(
            url.as_str(),
            "https://api.telegram.org/bot123456:ABC-def/sendMessage\
             ?chat_id=-100987&text=%E2%9A%A0%EF%B8%8F+Motion+detected%21+%286000+px%29"
        );
        Ok(())
    }

    #[test]
    fn send_message_url_tolerates_trailing_slash_and_path() -> Result<()> {
        let base = Url::parse("http://127.0.0.1:8081/proxy/")?;
        let url = send_message_url(&base, &Credentials::new("t/x", "1 2"), "hi&bye")?;
        assert_eq!(url.path(), "/proxy/bott%2Fx/sendMessage");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("chat_id".to_string(), "1 2".to_string()),
                ("text".to_string(), "hi&bye".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn non_base_url_is_rejected() {
        assert!(TelegramNotifier::new("mailto:ops@example.com", DEFAULT_SEND_TIMEOUT).is_err());
        assert!(TelegramNotifier::new("not a url", DEFAULT_SEND_TIMEOUT).is_err());
    }

    #[test]
    fn dispatch_reports_delivery() {
        let dispatcher = AlertDispatcher::new(Recording {
            sent: RefCell::new(Vec::new()),
            fail: false,
        });
        let outcome = dispatcher.dispatch(&AlertEvent::motion(MotionScore(9000)), &creds());
        assert!(outcome.is_delivered());
        assert_eq!(dispatcher.notifier().sent.borrow().len(), 1);
    }

    #[test]
    fn dispatch_swallows_transport_errors() {
        let dispatcher = AlertDispatcher::new(Recording {
            sent: RefCell::new(Vec::new()),
            fail: true,
        });
        let outcome = dispatcher.dispatch(&AlertEvent::motion(MotionScore(9000)), &creds());
        assert_eq!(
            outcome,
            DispatchOutcome::Failed("connection refused".to_string())
        );
    }

    #[test]
    fn telegram_send_hits_send_message() -> Result<()> {
        let (base, server) = serve_once("200 OK");
        let notifier = TelegramNotifier::new(&base, Duration::from_secs(5))?;
        notifier.send(&creds(), "hi")?;
        assert_eq!(
            server.join().unwrap(),
            "GET /bot123456:ABC-def/sendMessage?chat_id=-100987&text=hi HTTP/1.1"
        );
        Ok(())
    }

    #[test]
    fn telegram_error_status_is_an_error() -> Result<()> {
        let (base, server) = serve_once("500 Internal Server Error");
        let notifier = TelegramNotifier::new(&base, Duration::from_secs(5))?;
        let err = notifier.send(&creds(), "hi").unwrap_err();
        server.join().unwrap();
        let message = format!("{:#}", err);
        assert!(message.contains("500"), "unexpected error: {}", message);
        assert!(!message.contains("ABC-def"));
        Ok(())
    }

    #[test]
    fn telegram_transport_error_hides_the_token() -> Result<()> {
        let notifier = TelegramNotifier::new("http://127.0.0.1:9", Duration::from_secs(2))?;
        let err = notifier.send(&creds(), "hi").unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("telegram request failed"), "{}", message);
        assert!(!message.contains("ABC-def"));
        Ok(())
    }
}
