//! Integration tests for the SOAP transport against local fake devices.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use mockito::Matcher;
use soap_client::{message, SoapClient, SoapError, SubscriptionStatus};

/// Accept one connection, read the request head, then write `response`
/// one byte every `delay`. With `head_at_once` the status line and headers
/// go out immediately and only the body trickles.
fn trickling_device(response: &'static str, head_at_once: bool, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let host = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
        }

        let (head, body) = if head_at_once {
            let split = response.find("\r\n\r\n").unwrap() + 4;
            response.split_at(split)
        } else {
            ("", response)
        };
        if stream.write_all(head.as_bytes()).is_err() {
            return;
        }
        for byte in body.as_bytes() {
            thread::sleep(delay);
            if stream.write_all(&[*byte]).and_then(|_| stream.flush()).is_err() {
                return;
            }
        }
    });
    host
}

const SLOW_RESPONSE: &str =
    "HTTP/1.1 200 OK\r\nContent-Length: 40\r\nConnection: close\r\n\r\n<BinaryState>1</BinaryState>0123456789ab";

#[test]
fn test_invoke_posts_to_control_endpoint() {
    let mut server = mockito::Server::new();
    let body = message::get_binary_state();

    let mock = server
        .mock("POST", "/upnp/control/basicevent1")
        .match_header("soapaction", "\"urn:Belkin:service:basicevent:1#GetBinaryState\"")
        .match_header("content-type", "text/xml; charset=\"utf-8\"")
        .match_body(Matcher::Exact(body.clone()))
        .with_status(200)
        .with_body("<BinaryState>1</BinaryState>")
        .create();

    let client = SoapClient::new();
    let response = client
        .invoke(&server.host_with_port(), "basicevent", "GetBinaryState", &body)
        .unwrap();

    mock.assert();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("<BinaryState>1</BinaryState>"));
}

#[test]
fn test_invoke_keeps_error_status_as_response() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/upnp/control/basicevent1")
        .with_status(500)
        .with_body("<s:Fault/>")
        .create();

    let response = SoapClient::new()
        .invoke(
            &server.host_with_port(),
            "basicevent",
            "SetBinaryState",
            &message::set_binary_state(true),
        )
        .unwrap();

    assert_eq!(response.status, 500);
    assert!(!response.is_success());
    assert_eq!(response.body, "<s:Fault/>");
}

#[test]
fn test_invoke_refused_connection_is_network_error() {
    let host = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let result = SoapClient::new().invoke(&host, "basicevent", "GetBinaryState", "");
    assert!(matches!(result, Err(SoapError::Network(_))));
}

#[test]
fn test_invoke_read_timeout_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let host = listener.local_addr().unwrap().to_string();
    let _silent = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let client = SoapClient::with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
    let result = client.invoke(&host, "basicevent", "GetBinaryState", &message::get_binary_state());
    assert!(matches!(result, Err(SoapError::Network(_))));
}

#[test]
fn test_fetch_reads_setup_xml() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/setup.xml")
        .with_status(200)
        .with_body("<root><device><friendlyName>Desk</friendlyName></device></root>")
        .create();

    let response = SoapClient::new()
        .fetch(&server.host_with_port(), "/setup.xml")
        .unwrap();
    assert!(response.body.contains("Desk"));
}

#[test]
fn test_slow_body_is_bounded_by_exchange_timeout() {
    let host = trickling_device(SLOW_RESPONSE, true, Duration::from_millis(30));
    let client = SoapClient::with_timeouts(Duration::from_millis(300), Duration::from_millis(300));

    let started = Instant::now();
    let result = client.invoke(&host, "basicevent", "GetBinaryState", &message::get_binary_state());

    assert!(matches!(result, Err(SoapError::Network(_))), "got {result:?}");
    assert!(started.elapsed() < Duration::from_millis(1100));
}

#[test]
fn test_slow_headers_are_bounded_by_exchange_timeout() {
    let host = trickling_device(SLOW_RESPONSE, false, Duration::from_millis(30));
    let client = SoapClient::with_timeouts(Duration::from_millis(300), Duration::from_millis(300));

    let started = Instant::now();
    let result = client.fetch(&host, "/setup.xml");

    assert!(matches!(result, Err(SoapError::Network(_))), "got {result:?}");
    assert!(started.elapsed() < Duration::from_millis(1100));
}

#[test]
fn test_subscribe_sends_event_headers() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("SUBSCRIBE", "/upnp/event/basicevent1")
        .match_header("callback", "<http://10.0.1.2:6767/listener>")
        .match_header("nt", "upnp:event")
        .match_header("timeout", "Second-300")
        .match_header("path", "/upnp/event/basicevent1")
        .match_header("sid", Matcher::Missing)
        .with_status(200)
        .with_header("SID", "uuid:abc")
        .with_header("TIMEOUT", "Second-300")
        .create();

    let response = SoapClient::new()
        .subscribe(
            &server.host_with_port(),
            "/upnp/event/basicevent1",
            "http://10.0.1.2:6767/listener",
            300,
        )
        .unwrap();

    mock.assert();
    assert_eq!(response.outcome(), SubscriptionStatus::Accepted);
    assert_eq!(response.accepted_sid(), Some("uuid:abc"));
    assert_eq!(response.timeout_seconds, Some(300));
}

#[test]
fn test_resubscribe_stale_sid_reports_precondition_failed() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("SUBSCRIBE", "/upnp/event/bridge1")
        .match_header("sid", "uuid:stale")
        .match_header("timeout", "Second-300")
        .match_header("callback", Matcher::Missing)
        .match_header("nt", Matcher::Missing)
        .with_status(412)
        .create();

    let response = SoapClient::new()
        .resubscribe(&server.host_with_port(), "/upnp/event/bridge1", "uuid:stale", 300)
        .unwrap();

    mock.assert();
    assert_eq!(response.outcome(), SubscriptionStatus::PreconditionFailed);
    assert_eq!(response.accepted_sid(), None);
}

#[test]
fn test_resubscribe_keeps_sid_when_header_missing() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("SUBSCRIBE", "/upnp/event/basicevent1")
        .match_header("sid", "uuid:keep")
        .with_status(200)
        .create();

    let response = SoapClient::new()
        .resubscribe(&server.host_with_port(), "/upnp/event/basicevent1", "uuid:keep", 300)
        .unwrap();

    mock.assert();
    assert_eq!(response.accepted_sid(), Some("uuid:keep"));
}

#[test]
fn test_unsubscribe_returns_status() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("UNSUBSCRIBE", "/upnp/event/basicevent1")
        .match_header("sid", "uuid:gone")
        .with_status(412)
        .create();

    let status = SoapClient::new()
        .unsubscribe(&server.host_with_port(), "/upnp/event/basicevent1", "uuid:gone")
        .unwrap();

    mock.assert();
    assert_eq!(status, 412);
}
