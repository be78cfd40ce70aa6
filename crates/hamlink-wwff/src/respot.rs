//! One-shot cluster respot over telnet.
//!
//! The session is a fixed script:
//!
//! 1. wait for a login prompt anywhere in the accumulated text,
//! 2. send the operator callsign,
//! 3. wait for a `>` command prompt,
//! 4. send one `DX` line,
//! 5. linger for the settle period, then hang up.
//!
//! The whole exchange is bounded by one overall deadline. A cluster that
//! hangs up part way is not an error: many drop the line as soon as they
//! have what they need, so the result reports how far the script got.

use std::time::Duration;

use tokio::time::Instant;

use hamlink_core::error::{Error, Result};
use hamlink_core::transport::Transport;
use hamlink_transport::TcpTransport;

/// Default cluster host.
pub const DEFAULT_HOST: &str = "spots.wwff.co";

/// Default cluster telnet port.
pub const DEFAULT_PORT: u16 = 7300;

/// Default bound on the whole exchange.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default linger after the `DX` line.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1500);

const READ_CHUNK: usize = 1024;

/// Texts that count as a login prompt, matched case-insensitively.
const LOGIN_PROMPTS: &[&str] = &["login:", "callsign:", "call:", "enter your call"];

/// Respotter configuration.
#[derive(Debug, Clone)]
pub struct RespotOptions {
    pub host: String,
    pub port: u16,
    /// Operator callsign sent at the login prompt.
    pub callsign: String,
    pub overall_timeout: Duration,
    pub settle: Duration,
}

impl RespotOptions {
    /// Options for `callsign` against the default cluster.
    pub fn new(callsign: &str) -> Self {
        RespotOptions {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            callsign: callsign.trim().to_uppercase(),
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// The spot to post.
#[derive(Debug, Clone, PartialEq)]
pub struct RespotRequest {
    pub freq_khz: f64,
    pub activator: String,
    /// WWFF reference, e.g. `KFF-1234`.
    pub reference: String,
    pub mode: String,
    pub comment: Option<String>,
}

impl RespotRequest {
    /// The `DX` command line, without line ending.
    ///
    /// ```
    /// use hamlink_wwff::RespotRequest;
    ///
    /// let req = RespotRequest {
    ///     freq_khz: 14_244.0,
    ///     activator: "k1abc".into(),
    ///     reference: "KFF-1234".into(),
    ///     mode: "SSB".into(),
    ///     comment: None,
    /// };
    /// assert_eq!(req.command_line(), "DX 14244.0 K1ABC KFF-1234 SSB");
    /// ```
    pub fn command_line(&self) -> String {
        let mut line = format!(
            "DX {:.1} {} {} {}",
            self.freq_khz,
            single_line(&self.activator).to_uppercase(),
            single_line(&self.reference).to_uppercase(),
            single_line(&self.mode).to_uppercase(),
        );
        if let Some(comment) = self.comment.as_deref().map(single_line) {
            if !comment.is_empty() {
                line.push(' ');
                line.push_str(&comment);
            }
        }
        line
    }
}

fn single_line(text: &str) -> String {
    text.split(['\r', '\n']).collect::<Vec<_>>().join(" ").trim().to_string()
}

/// How far the script got before the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespotOutcome {
    /// The cluster hung up before asking for a login.
    Closed,
    /// The callsign was sent, then the cluster hung up before the prompt.
    LoginSent,
    /// The `DX` line was sent.
    CommandSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitLogin,
    AwaitPrompt,
}

impl Stage {
    fn outcome(self) -> RespotOutcome {
        match self {
            Stage::AwaitLogin => RespotOutcome::Closed,
            Stage::AwaitPrompt => RespotOutcome::LoginSent,
        }
    }
}

fn is_login_prompt(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    LOGIN_PROMPTS.iter().any(|p| lower.contains(p))
}

/// Posts single spots to a WWFF cluster.
#[derive(Debug, Clone)]
pub struct WwffRespotter {
    options: RespotOptions,
}

impl WwffRespotter {
    pub fn new(options: RespotOptions) -> Self {
        WwffRespotter { options }
    }

    pub fn options(&self) -> &RespotOptions {
        &self.options
    }

    /// Connect to the cluster over TCP and post `request`.
    pub async fn respot(&self, request: &RespotRequest) -> Result<RespotOutcome> {
        self.validate()?;
        let deadline = Instant::now() + self.options.overall_timeout;
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let mut transport =
            TcpTransport::connect_with_timeout(&addr, self.options.overall_timeout).await?;
        self.run(&mut transport, request, deadline).await
    }

    /// Post `request` over an already open transport. The transport is
    /// closed when this returns.
    pub async fn respot_over<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        request: &RespotRequest,
    ) -> Result<RespotOutcome> {
        self.validate()?;
        let deadline = Instant::now() + self.options.overall_timeout;
        self.run(transport, request, deadline).await
    }

    fn validate(&self) -> Result<()> {
        if self.options.callsign.is_empty() || self.options.callsign.contains(char::is_whitespace)
        {
            return Err(Error::InvalidParameter(format!(
                "invalid login callsign: {:?}",
                self.options.callsign
            )));
        }
        Ok(())
    }

    async fn run<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        request: &RespotRequest,
        deadline: Instant,
    ) -> Result<RespotOutcome> {
        let result = self.script(transport, request, deadline).await;
        let _ = transport.close().await;
        match &result {
            Ok(outcome) => tracing::debug!(outcome = ?outcome, "WWFF respot finished"),
            Err(e) => tracing::warn!(error = %e, "WWFF respot failed"),
        }
        result
    }

    async fn script<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        request: &RespotRequest,
        deadline: Instant,
    ) -> Result<RespotOutcome> {
        let mut stage = Stage::AwaitLogin;
        let mut text = String::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            match transport.receive(&mut buf, remaining).await {
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    tracing::trace!(text = %chunk.trim_end(), "WWFF cluster said");
                    text.push_str(&chunk);
                }
                Err(Error::ConnectionLost) => {
                    tracing::debug!(stage = ?stage, "WWFF cluster hung up early");
                    return Ok(stage.outcome());
                }
                Err(e) => return Err(e),
            }

            match stage {
                Stage::AwaitLogin if is_login_prompt(&text) => {
                    tracing::debug!(callsign = %self.options.callsign, "Logging in to WWFF cluster");
                    transport
                        .send(format!("{}\r\n", self.options.callsign).as_bytes())
                        .await?;
                    text.clear();
                    stage = Stage::AwaitPrompt;
                }
                Stage::AwaitPrompt if text.contains('>') => {
                    let line = request.command_line();
                    tracing::debug!(command = %line, "Sending WWFF spot");
                    transport.send(format!("{line}\r\n").as_bytes()).await?;
                    break;
                }
                _ => {}
            }
        }

        self.settle(transport, deadline).await;
        Ok(RespotOutcome::CommandSent)
    }

    /// Keep reading until the settle period ends, the deadline passes, or
    /// the cluster hangs up.
    async fn settle<T: Transport + ?Sized>(&self, transport: &mut T, deadline: Instant) {
        let until = (Instant::now() + self.options.settle).min(deadline);
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match transport.receive(&mut buf, remaining).await {
                Ok(n) => {
                    tracing::trace!(
                        text = %String::from_utf8_lossy(&buf[..n]).trim_end(),
                        "WWFF cluster said"
                    );
                }
                Err(_) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamlink_test_harness::{MockTcpServer, MockTransport};

    const DX_LINE: &[u8] = b"DX 14244.0 K1ABC KFF-1234 SSB QRT soon\r\n";

    fn request() -> RespotRequest {
        RespotRequest {
            freq_khz: 14_244.0,
            activator: "K1ABC".into(),
            reference: "kff-1234".into(),
            mode: "ssb".into(),
            comment: Some("QRT soon".into()),
        }
    }

    fn respotter() -> WwffRespotter {
        WwffRespotter::new(RespotOptions::new("n0call"))
    }

    #[test]
    fn command_line_strips_line_breaks() {
        let mut req = request();
        req.comment = Some("hello\r\nDX 1 FAKE".into());
        assert_eq!(
            req.command_line(),
            "DX 14244.0 K1ABC KFF-1234 SSB hello  DX 1 FAKE"
        );
        req.comment = Some("  ".into());
        assert_eq!(req.command_line(), "DX 14244.0 K1ABC KFF-1234 SSB");
    }

    #[test]
    fn login_prompt_variants() {
        assert!(is_login_prompt("Welcome\r\nlogin: "));
        assert!(is_login_prompt("Please enter your call: "));
        assert!(is_login_prompt("CALLSIGN:"));
        assert!(!is_login_prompt("Welcome to the WWFF cluster\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_script_then_settle() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"WWFF cluster\r\nlogin: ");
        mock.expect(b"N0CALL\r\n", b"Hello N0CALL\r\nN0CALL de WWFF >");
        mock.expect(DX_LINE, b"\r\nN0CALL de WWFF >");

        let start = Instant::now();
        let outcome = respotter().respot_over(&mut mock, &request()).await.unwrap();
        assert_eq!(outcome, RespotOutcome::CommandSent);
        assert_eq!(start.elapsed(), DEFAULT_SETTLE);
        assert_eq!(mock.remaining_expectations(), 0);
        assert!(!mock.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn hangup_after_command_ends_settle_early() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"login: ");
        mock.expect(b"N0CALL\r\n", b">");
        mock.expect(DX_LINE, b"");
        mock.set_eof_when_drained(true);

        let start = Instant::now();
        let outcome = respotter().respot_over(&mut mock, &request()).await.unwrap();
        assert_eq!(outcome, RespotOutcome::CommandSent);
        assert!(start.elapsed() < DEFAULT_SETTLE);
    }

    #[tokio::test(start_paused = true)]
    async fn hangups_before_command_are_best_effort() {
        let mut mock = MockTransport::new();
        mock.set_eof_when_drained(true);
        let outcome = respotter().respot_over(&mut mock, &request()).await.unwrap();
        assert_eq!(outcome, RespotOutcome::Closed);

        let mut mock = MockTransport::new();
        mock.push_incoming(b"login: ");
        mock.expect(b"N0CALL\r\n", b"Sorry, full\r\n");
        mock.set_eof_when_drained(true);
        let outcome = respotter().respot_over(&mut mock, &request()).await.unwrap();
        assert_eq!(outcome, RespotOutcome::LoginSent);
        assert_eq!(mock.sent_text(), vec!["N0CALL\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cluster_times_out_at_deadline() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"login: ");
        mock.expect(b"N0CALL\r\n", b"Hello N0CALL\r\n");

        let start = Instant::now();
        let err = respotter().respot_over(&mut mock, &request()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(start.elapsed(), DEFAULT_OVERALL_TIMEOUT);
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn empty_callsign_is_rejected() {
        let mut mock = MockTransport::new();
        let err = WwffRespotter::new(RespotOptions::new(" "))
            .respot_over(&mut mock, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn respot_over_loopback_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.greeting(b"Welcome to WWFF\r\nlogin: ");
        server.expect(b"N0CALL\r\n", b"Hello N0CALL\r\nN0CALL de WWFF >");
        server.expect(DX_LINE, b"Spot accepted\r\n");
        server.close_after_script();
        server.start();

        let (host, port) = server.addr().rsplit_once(':').unwrap();
        let mut options = RespotOptions::new("N0CALL");
        options.host = host.to_string();
        options.port = port.parse().unwrap();

        let outcome = WwffRespotter::new(options).respot(&request()).await.unwrap();
        assert_eq!(outcome, RespotOutcome::CommandSent);
        server.wait().await.unwrap();
    }
}
