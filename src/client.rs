use crate::{
    auth::{AuthState, AuthTracker},
    error::RconError,
    ledger::RequestLedger,
    packet::{Packet, PacketType, AUTH_FAILED_ID},
    transport::{self, TransportEvent, TransportHandle},
};
use log::{info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the handshake waits for the server's verdict.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long [`Client::command`] waits for a response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Packet ids wrap back to 1 after this value. Keeps the set of ids that can
/// be outstanding at once small and far away from i32 overflow.
const MAX_PACKET_ID: i32 = 200;

/// Asynchronous rcon client. Call `connect()` to establish a connection and
/// authenticate. The client should be `mut` as it keeps a counter used for
/// [Packet] IDs.
///
/// ## Example
/// ```no_run
/// use srcon::client::Client;
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     // client must be mutable so we can increment packet IDs
///     let mut client = Client::connect("dev.viora.sh", 27016, Some("<rcon password>")).await?;
///
///     match client.command("echo hi").await? {
///         Some(response) => assert_eq!(response.body(), "hi"),
///         None => println!("server did not answer in time"),
///     }
///     Ok(())
/// }
/// ```
pub struct Client {
    next_packet_id: i32,
    password: Option<String>,
    transport: TransportHandle,
    ledger: Arc<RequestLedger>,
    auth: AuthTracker,
}

impl Client {
    /// Connects to the server and, if a password was supplied,
    /// authenticates before returning. A rejected password (or a handshake
    /// the server never answers) fails the constructor with
    /// [`RconError::AuthenticationFailed`]. Without a password the session
    /// starts unauthenticated and never attempts the handshake.
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, RconError> {
        let (handle, events) = transport::connect(host, port).await?;
        Self::from_transport(handle, events, password).await
    }

    /// Builds a session on top of an already-connected transport.
    pub(crate) async fn from_transport(
        transport: TransportHandle,
        events: mpsc::Receiver<TransportEvent>,
        password: Option<&str>,
    ) -> Result<Self, RconError> {
        let ledger = Arc::new(RequestLedger::new());
        let auth = AuthTracker::new();
        tokio::spawn(dispatch(
            Arc::clone(&ledger),
            auth.clone(),
            transport.clone(),
            events,
        ));

        let mut client = Client {
            next_packet_id: 1,
            password: password.map(str::to_string),
            transport,
            ledger,
            auth,
        };

        if client.password.is_some() {
            client.authenticate().await?;
        } else {
            // no password means the session is knowingly unauthenticated
            client.auth.fail();
        }

        Ok(client)
    }

    /// Authenticates with the stored password. Safe to call again to
    /// re-authenticate.
    ///
    /// The auth packet carries the *current* packet id without advancing
    /// the counter; the server's verdict is recognised by packet type (or
    /// the `-1` failure sentinel), not through the request ledger, so the
    /// id is never considered spent.
    ///
    /// Any outcome other than an accepted password — explicit rejection or
    /// a silent 10 second timeout — shuts the connection down and fails
    /// with [`RconError::AuthenticationFailed`].
    pub async fn authenticate(&mut self) -> Result<(), RconError> {
        let Some(password) = self.password.clone() else {
            warn!("authenticate called on a session with no password");
            return Err(RconError::AuthenticationFailed);
        };

        self.auth.reset();
        let packet = Packet::new(self.next_packet_id, PacketType::Auth, password);
        trace!("sending auth packet with id {}", packet.id());
        self.transport.send(packet.pack()).await?;

        match self.auth.wait(AUTH_TIMEOUT).await {
            AuthState::Pass => Ok(()),
            _ => {
                self.transport.shutdown().await;
                Err(RconError::AuthenticationFailed)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.state() == AuthState::Pass
    }

    /// Runs a command with the default 10 second response window.
    pub async fn command(&mut self, command: &str) -> Result<Option<Packet>, RconError> {
        self.command_with_timeout(command, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Runs `command` and waits up to `timeout` for the response carrying
    /// the same packet id. `Ok(None)` means the server never answered; the
    /// id is freed before returning and a late reply for it will be
    /// silently dropped. A timed out command is not retried — reissue it to
    /// try again with a fresh id.
    pub async fn command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<Option<Packet>, RconError> {
        let id = self.next_id();
        let response = self.ledger.begin(id).await?;

        let packet = Packet::new(id, PacketType::Exec, command);
        trace!("sending command packet with id {}", id);
        if let Err(e) = self.transport.send(packet.pack()).await {
            self.ledger.cancel(id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(raw)) => Ok(Some(Packet::unpack(&raw)?)),
            // the dispatch task dropped our sender: connection is gone
            Ok(Err(_)) => {
                self.ledger.cancel(id).await;
                Err(RconError::ConnectionClosed)
            }
            Err(_) => {
                trace!("command with id {} timed out", id);
                self.ledger.cancel(id).await;
                Ok(None)
            }
        }
    }

    /// Closes the connection.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    // Advance-then-wrap: ids run 1..=200 in order and start over.
    fn next_id(&mut self) -> i32 {
        let id = self.next_packet_id;
        self.next_packet_id += 1;
        if self.next_packet_id > MAX_PACKET_ID {
            self.next_packet_id = 1;
        }
        id
    }
}

/// Routes every inbound packet to exactly one consumer: the ledger entry
/// matching its id, checked first (the shared wire value of the auth
/// response and exec types makes id membership the only reliable
/// discriminator), then the auth state machine.
async fn dispatch(
    ledger: Arc<RequestLedger>,
    auth: AuthTracker,
    transport: TransportHandle,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Packet(raw) => {
                let packet = match Packet::unpack(&raw) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("dropping undecodable packet: {}", e);
                        continue;
                    }
                };
                trace!("receive response for packet id {}", packet.id());

                if ledger.complete(packet.id(), raw).await {
                    continue;
                }
                if packet.id() == AUTH_FAILED_ID {
                    info!("authentication failed");
                    auth.fail();
                    // auth failure is terminal for the connection
                    transport.shutdown().await;
                } else if packet.packet_type() == PacketType::AuthResponse {
                    info!("authentication passed");
                    auth.pass();
                } else {
                    trace!("dropping unsolicited packet with id {}", packet.id());
                }
            }
            TransportEvent::Closed => break,
        }
    }

    info!("rcon server closed the connection");
    ledger.fail_all().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Outbound;

    /// The far side of a fake transport: observes what the client sends and
    /// injects framed packets as if the server had answered.
    struct FakeServer {
        outbound: mpsc::Receiver<Outbound>,
        events: mpsc::Sender<TransportEvent>,
    }

    fn harness() -> (TransportHandle, mpsc::Receiver<TransportEvent>, FakeServer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        (
            TransportHandle::new(outbound_tx),
            event_rx,
            FakeServer {
                outbound: outbound_rx,
                events: event_tx,
            },
        )
    }

    impl FakeServer {
        async fn recv_packet(&mut self) -> Packet {
            match self.outbound.recv().await.expect("transport dropped") {
                Outbound::Frame(frame) => Packet::unpack(&frame).expect("client sent bad frame"),
                Outbound::Shutdown => panic!("unexpected shutdown"),
            }
        }

        async fn expect_shutdown(&mut self) {
            loop {
                match self.outbound.recv().await.expect("transport dropped") {
                    Outbound::Shutdown => return,
                    Outbound::Frame(_) => continue,
                }
            }
        }

        async fn deliver(&self, packet: &Packet) {
            self.events
                .send(TransportEvent::Packet(packet.pack()))
                .await
                .expect("dispatch task gone");
        }

        async fn close(&self) {
            let _ = self.events.send(TransportEvent::Closed).await;
        }
    }

    #[tokio::test]
    async fn no_password_means_no_handshake() {
        let (handle, events, mut server) = harness();
        let client = Client::from_transport(handle, events, None).await.unwrap();

        assert!(!client.is_authenticated());
        assert_eq!(client.auth.state(), AuthState::Fail);
        // nothing was sent on the wire
        assert!(server.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn authenticates_and_runs_a_command() {
        let (handle, events, mut server) = harness();

        let server_task = tokio::spawn(async move {
            let auth = server.recv_packet().await;
            assert_eq!(auth.packet_type(), PacketType::Auth);
            assert_eq!(auth.body(), "pro");
            server
                .deliver(&Packet::new(auth.id(), PacketType::AuthResponse, ""))
                .await;

            let exec = server.recv_packet().await;
            assert_eq!(exec.body(), "status");
            server
                .deliver(&Packet::new(exec.id(), PacketType::Response, "hostname: foo"))
                .await;
            (auth.id(), exec.id())
        });

        let mut client = Client::from_transport(handle, events, Some("pro"))
            .await
            .unwrap();
        assert!(client.is_authenticated());

        let response = client
            .command("status")
            .await
            .unwrap()
            .expect("command should not time out");
        assert_eq!(response.body(), "hostname: foo");
        assert_eq!(response.packet_type(), PacketType::Response);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn authenticate_reuses_the_current_id_without_advancing() {
        let (handle, events, mut server) = harness();

        let server_task = tokio::spawn(async move {
            let auth = server.recv_packet().await;
            server
                .deliver(&Packet::new(auth.id(), PacketType::AuthResponse, ""))
                .await;
            let exec = server.recv_packet().await;
            server
                .deliver(&Packet::new(exec.id(), PacketType::Response, "ok"))
                .await;
            (auth.id(), exec.id())
        });

        let mut client = Client::from_transport(handle, events, Some("pro"))
            .await
            .unwrap();
        client.command("status").await.unwrap();

        // auth did not spend the id, so the first command reuses it
        let (auth_id, exec_id) = server_task.await.unwrap();
        assert_eq!(auth_id, 1);
        assert_eq!(exec_id, 1);
    }

    #[tokio::test]
    async fn rejected_password_fails_the_constructor_and_closes_the_transport() {
        let (handle, events, mut server) = harness();

        let server_task = tokio::spawn(async move {
            let _auth = server.recv_packet().await;
            server
                .deliver(&Packet::new(AUTH_FAILED_ID, PacketType::AuthResponse, ""))
                .await;
            server.expect_shutdown().await;
        });

        let err = Client::from_transport(handle, events, Some("wrong"))
            .await
            .err()
            .expect("construction should fail");
        assert!(matches!(err, RconError::AuthenticationFailed));

        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_auth_timeout_also_closes_the_transport() {
        let (handle, events, mut server) = harness();

        let server_task = tokio::spawn(async move {
            let _auth = server.recv_packet().await;
            // say nothing; the client should give up and hang up
            server.expect_shutdown().await;
        });

        let err = Client::from_transport(handle, events, Some("pro"))
            .await
            .err()
            .expect("construction should fail");
        assert!(matches!(err, RconError::AuthenticationFailed));

        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn command_timeout_frees_the_id_immediately() {
        let (handle, events, _server) = harness();
        let mut client = Client::from_transport(handle, events, None).await.unwrap();

        let response = client
            .command_with_timeout("status", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(!client.ledger.is_pending(1).await);
        assert!(client.ledger.begin(1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_after_timeout_is_dropped() {
        let (handle, events, mut server) = harness();
        let mut client = Client::from_transport(handle, events, None).await.unwrap();

        let response = client
            .command_with_timeout("status", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(response.is_none());

        // reply arrives after the waiter gave up; nothing should blow up
        let exec = server.recv_packet().await;
        server
            .deliver(&Packet::new(exec.id(), PacketType::Response, "too late"))
            .await;
        tokio::task::yield_now().await;

        assert!(!client.ledger.is_pending(exec.id()).await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn connection_close_fails_pending_commands_immediately() {
        let (handle, events, mut server) = harness();
        let client = Client::from_transport(handle, events, None).await.unwrap();

        let command_task = tokio::spawn(async move {
            let mut client = client;
            client.command("status").await
        });

        let _exec = server.recv_packet().await;
        server.close().await;

        let result = command_task.await.unwrap();
        assert!(matches!(result, Err(RconError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn ids_wrap_from_200_back_to_1() {
        let (handle, events, _server) = harness();
        let mut client = Client::from_transport(handle, events, None).await.unwrap();

        for expected in 1..=200 {
            assert_eq!(client.next_id(), expected);
        }
        assert_eq!(client.next_id(), 1);
    }
}
