use crate::dns::Transport;
use crate::record_store::{DynRecordStore, TxtRecord};
use hickory_proto::error::ProtoError;
use hickory_proto::op::{Edns, Header, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{NS, SOA, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::net::SocketAddr;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

/// TTL of every synthesized answer, and the SOA timer values.
const TTL: u32 = 10;

/// Longest value a single TXT character-string can carry.
const MAX_TXT_LEN: usize = 255;

/// UDP payload every resolver accepts (RFC 1035).
const MIN_UDP_PAYLOAD: u16 = 512;

/// UDP payload advertised to, and accepted from, EDNS clients.
const MAX_UDP_PAYLOAD: u16 = 1232;

/// Answers queries from the [record store][crate::record_store].
#[derive(Clone)]
pub struct Handler {
    store: DynRecordStore,
}

#[derive(thiserror::Error, Debug)]
enum SynthesisError {
    #[error("server hostname \"{hostname}\" is not a valid DNS name")]
    Hostname {
        hostname: String,
        #[source]
        source: ProtoError,
    },
    #[error("server hostname is empty")]
    EmptyHostname,
    #[error("TXT value is {0} bytes, longer than {MAX_TXT_LEN}")]
    TxtTooLong(usize),
}

impl Handler {
    #[must_use]
    pub fn new(store: DynRecordStore) -> Self {
        Handler { store }
    }

    /// Decode a wire-format request received over `transport` and encode its reply.
    ///
    /// Returns `None` for packets that aren't DNS messages; those are dropped unanswered.
    /// UDP replies that don't fit the client's payload size are sent truncated.
    pub async fn handle_packet(
        &self,
        packet: &[u8],
        src: SocketAddr,
        transport: Transport,
    ) -> Option<Vec<u8>> {
        let request = match Message::from_vec(packet) {
            Ok(m) => m,
            Err(err) => {
                debug!("dropping malformed {transport} message from {src}: {err}");
                return None;
            }
        };
        debug!("{transport} query from {src}: {:?}", request.queries());

        let response = self.respond(&request).await;
        let encoded = match encode(&response) {
            Ok(buf) => buf,
            Err(err) => {
                error!("error encoding DNS response to {src}: {err}");
                let servfail =
                    Message::error_msg(request.id(), request.op_code(), ResponseCode::ServFail);
                return encode(&servfail).ok();
            }
        };

        if transport == Transport::Udp && encoded.len() > udp_payload_limit(&request) {
            debug!("truncating {} byte UDP response to {src}", encoded.len());
            let mut truncated = reply_to(&request);
            truncated.set_truncated(true);
            return encode(&truncated).ok();
        }
        Some(encoded)
    }

    /// Build the reply to `request`: its header and questions echoed back, plus an answer
    /// section for every question when it's a plain query.
    pub async fn respond(&self, request: &Message) -> Message {
        let mut response = reply_to(request);
        // Anything other than a plain query gets an empty reply.
        if request.op_code() == OpCode::Query && request.message_type() == MessageType::Query {
            response.add_answers(self.answers(request.queries()).await);
        }
        response
    }

    /// Build the answer section for `queries` from the current store contents.
    ///
    /// Questions for unknown names or unsupported types contribute nothing. An answer that
    /// can't be synthesized is logged and left out; the others are still returned.
    pub async fn answers(&self, queries: &[Query]) -> Vec<Record> {
        self.answers_at(queries, OffsetDateTime::now_utc()).await
    }

    async fn answers_at(&self, queries: &[Query], now: OffsetDateTime) -> Vec<Record> {
        let mut answers = Vec::new();
        for query in queries {
            let Some(record) = self.store.read().await.lookup(&query.name().to_string()) else {
                debug!("no record for {} {}", query.name(), query.query_type());
                continue;
            };
            for answer in Self::synthesize(query, &record, now) {
                match answer {
                    Ok(rr) => answers.push(rr),
                    Err(err) => {
                        warn!("omitting {} answer for {}: {err}", query.query_type(), query.name());
                    }
                }
            }
        }
        answers
    }

    fn synthesize(
        query: &Query,
        record: &TxtRecord,
        now: OffsetDateTime,
    ) -> Vec<Result<Record, SynthesisError>> {
        // Answer with the question's own spelling of the name.
        let owner = query.name();
        match query.query_type() {
            RecordType::SOA => vec![soa_record(owner, &record.owner_hostname, serial(now))],
            RecordType::NS => vec![ns_record(owner, &record.owner_hostname)],
            RecordType::TXT => record
                .values
                .iter()
                .map(|value| txt_record(owner, value))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn reply_to(request: &Message) -> Message {
    let mut header = Header::response_from_request(request.header());
    header.set_authoritative(true);
    let mut response = Message::new();
    response.set_header(header);
    response.add_queries(request.queries().iter().cloned());
    if request.extensions().is_some() {
        let mut edns = Edns::new();
        edns.set_max_payload(MAX_UDP_PAYLOAD);
        response.set_edns(edns);
    }
    response
}

fn udp_payload_limit(request: &Message) -> usize {
    let limit = request
        .extensions()
        .as_ref()
        .map_or(MIN_UDP_PAYLOAD, |edns| {
            edns.max_payload().clamp(MIN_UDP_PAYLOAD, MAX_UDP_PAYLOAD)
        });
    usize::from(limit)
}

/// Encode `message` with name compression disabled.
fn encode(message: &Message) -> Result<Vec<u8>, ProtoError> {
    let mut buf = Vec::with_capacity(usize::from(MIN_UDP_PAYLOAD));
    let mut encoder = BinEncoder::new(&mut buf);
    encoder.set_canonical_names(true);
    message.emit(&mut encoder)?;
    Ok(buf)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn serial(now: OffsetDateTime) -> u32 {
    // Serials wrap, see RFC 1982.
    now.unix_timestamp() as u32
}

fn host_name(hostname: &str) -> Result<Name, SynthesisError> {
    let hostname = hostname.trim();
    if hostname.is_empty() || hostname == "." {
        return Err(SynthesisError::EmptyHostname);
    }
    let mut name = Name::from_str(hostname).map_err(|source| SynthesisError::Hostname {
        hostname: hostname.to_string(),
        source,
    })?;
    name.set_fqdn(true);
    Ok(name)
}

fn soa_record(owner: &Name, hostname: &str, serial: u32) -> Result<Record, SynthesisError> {
    let mname = host_name(hostname)?;
    let rname = Name::from_ascii("admin")
        .and_then(|admin| admin.append_domain(&mname))
        .map_err(|source| SynthesisError::Hostname {
            hostname: hostname.to_string(),
            source,
        })?;
    #[allow(clippy::cast_possible_wrap)]
    let soa = SOA::new(
        mname,
        rname,
        serial,
        TTL as i32,
        TTL as i32,
        TTL as i32,
        TTL,
    );
    Ok(Record::from_rdata(owner.clone(), TTL, RData::SOA(soa)))
}

fn ns_record(owner: &Name, hostname: &str) -> Result<Record, SynthesisError> {
    let ns = host_name(hostname)?;
    Ok(Record::from_rdata(owner.clone(), TTL, RData::NS(NS(ns))))
}

fn txt_record(owner: &Name, value: &str) -> Result<Record, SynthesisError> {
    if value.len() > MAX_TXT_LEN {
        return Err(SynthesisError::TxtTooLong(value.len()));
    }
    let txt = TXT::new(vec![value.to_string()]);
    Ok(Record::from_rdata(owner.clone(), TTL, RData::TXT(txt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::{InMemoryRecordStore, RecordStore};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    const FQDN: &str = "_acme-challenge.example.com.";
    const HOST: &str = "ns1.example.com";

    fn handler(values: &[&str], hostname: &str) -> Handler {
        let mut store = InMemoryRecordStore::default();
        for value in values {
            store.add_value(FQDN, hostname, (*value).to_string());
        }
        Handler::new(Arc::new(RwLock::new(store)))
    }

    // `from_ascii` keeps the caller's case, as a name decoded off the wire does.
    fn query(name: &str, record_type: RecordType) -> Query {
        Query::query(Name::from_ascii(name).unwrap(), record_type)
    }

    fn request(id: u16, queries: &[Query]) -> Message {
        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.add_queries(queries.iter().cloned());
        message
    }

    fn client() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5353))
    }

    fn txt_strings(record: &Record) -> Vec<String> {
        match record.data() {
            Some(RData::TXT(txt)) => txt
                .txt_data()
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect(),
            other => panic!("expected TXT rdata, got {other:?}"),
        }
    }

    fn soa(record: &Record) -> &SOA {
        match record.data() {
            Some(RData::SOA(soa)) => soa,
            other => panic!("expected SOA rdata, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn respond_answers_every_question_of_a_message() {
        let handler = handler(&["abc123"], HOST);
        let request = request(
            99,
            &[query(FQDN, RecordType::TXT), query(FQDN, RecordType::NS)],
        );
        let response = handler.respond(&request).await;

        assert_eq!(response.id(), 99);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.authoritative());
        assert_eq!(response.queries(), request.queries());
        assert_eq!(response.answers().len(), 2);
        assert_eq!(response.answers()[0].record_type(), RecordType::TXT);
        assert_eq!(response.answers()[1].record_type(), RecordType::NS);
    }

    #[tokio::test]
    async fn non_query_opcode_gets_empty_reply() {
        let handler = handler(&["abc123"], HOST);
        let mut request = request(5, &[query(FQDN, RecordType::TXT)]);
        request.set_op_code(OpCode::Notify);
        let response = handler.respond(&request).await;

        assert_eq!(response.id(), 5);
        assert_eq!(response.op_code(), OpCode::Notify);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.answers().is_empty());
    }

    #[tokio::test]
    async fn encoded_reply_has_no_compression_pointers() {
        let handler = handler(&["abc123", "def456"], HOST);
        let request = request(
            1,
            &[query(FQDN, RecordType::TXT), query(FQDN, RecordType::NS)],
        );
        let packet = handler
            .handle_packet(&request.to_vec().unwrap(), client(), Transport::Tcp)
            .await
            .unwrap();

        // Pointers start with 0xC0 here; no label, count or rdata byte of this reply does.
        assert!(!packet.contains(&0xC0), "compressed reply: {packet:?}");
        let response = Message::from_vec(&packet).unwrap();
        assert_eq!(response.answers().len(), 3);
    }

    #[tokio::test]
    async fn malformed_packet_is_dropped() {
        let handler = handler(&["abc123"], HOST);
        let reply = handler
            .handle_packet(&[0x12, 0x34, 0x01], client(), Transport::Udp)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn oversized_udp_reply_is_truncated() {
        let values: Vec<String> = (0..4).map(|i| format!("{i}{}", "x".repeat(200))).collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        let handler = handler(&values, HOST);
        let packet = request(8, &[query(FQDN, RecordType::TXT)]).to_vec().unwrap();

        let udp = handler
            .handle_packet(&packet, client(), Transport::Udp)
            .await
            .unwrap();
        let udp = Message::from_vec(&udp).unwrap();
        assert!(udp.truncated());
        assert!(udp.answers().is_empty());
        assert_eq!(udp.queries().len(), 1);

        let tcp = handler
            .handle_packet(&packet, client(), Transport::Tcp)
            .await
            .unwrap();
        let tcp = Message::from_vec(&tcp).unwrap();
        assert!(!tcp.truncated());
        assert_eq!(tcp.answers().len(), 4);
    }

    #[tokio::test]
    async fn edns_payload_size_raises_udp_limit() {
        let values: Vec<String> = (0..4).map(|i| format!("{i}{}", "x".repeat(200))).collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        let handler = handler(&values, HOST);
        let mut request = request(9, &[query(FQDN, RecordType::TXT)]);
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        request.set_edns(edns);

        let udp = handler
            .handle_packet(&request.to_vec().unwrap(), client(), Transport::Udp)
            .await
            .unwrap();
        let udp = Message::from_vec(&udp).unwrap();
        assert!(!udp.truncated());
        assert_eq!(udp.answers().len(), 4);
        assert_eq!(
            udp.extensions().as_ref().map(Edns::max_payload),
            Some(MAX_UDP_PAYLOAD)
        );
    }

    #[tokio::test]
    async fn txt_answers_follow_store_order() {
        let handler = handler(&["abc123", "def456"], HOST);
        let answers = handler.answers(&[query(FQDN, RecordType::TXT)]).await;

        assert_eq!(answers.len(), 2);
        assert_eq!(txt_strings(&answers[0]), vec!["abc123"]);
        assert_eq!(txt_strings(&answers[1]), vec!["def456"]);
        for answer in &answers {
            assert_eq!(answer.ttl(), TTL);
            assert_eq!(answer.name().to_string(), FQDN);
        }
    }

    #[tokio::test]
    async fn lookup_ignores_question_case() {
        let handler = handler(&["abc123"], HOST);
        let answers = handler
            .answers(&[query("_ACME-Challenge.EXAMPLE.com.", RecordType::TXT)])
            .await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].name().to_ascii(), "_ACME-Challenge.EXAMPLE.com.");
    }

    #[tokio::test]
    async fn unknown_name_has_no_answers() {
        let handler = handler(&["abc123"], HOST);
        let answers = handler
            .answers(&[query("_acme-challenge.example.org.", RecordType::TXT)])
            .await;
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn unsupported_type_has_no_answers() {
        let handler = handler(&["abc123"], HOST);
        let answers = handler
            .answers(&[
                query(FQDN, RecordType::A),
                query(FQDN, RecordType::AAAA),
                query(FQDN, RecordType::MX),
            ])
            .await;
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn ns_names_owner_hostname() {
        let handler = handler(&["abc123", "def456"], HOST);
        let answers = handler.answers(&[query(FQDN, RecordType::NS)]).await;

        assert_eq!(answers.len(), 1);
        match answers[0].data() {
            Some(RData::NS(ns)) => assert_eq!(ns.0.to_string(), "ns1.example.com."),
            other => panic!("expected NS rdata, got {other:?}"),
        }
        assert_eq!(answers[0].ttl(), TTL);
    }

    #[tokio::test]
    async fn soa_serial_tracks_clock() {
        let handler = handler(&["abc123"], HOST);
        let queries = [query(FQDN, RecordType::SOA)];
        let first = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let second = OffsetDateTime::from_unix_timestamp(1_700_000_001).unwrap();

        let a = handler.answers_at(&queries, first).await;
        let b = handler.answers_at(&queries, second).await;
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);

        let (a, b) = (soa(&a[0]), soa(&b[0]));
        assert_eq!(a.serial(), 1_700_000_000);
        assert_eq!(b.serial(), 1_700_000_001);
        assert_eq!(a.mname().to_string(), "ns1.example.com.");
        assert_eq!(a.rname().to_string(), "admin.ns1.example.com.");
        assert_eq!(a.mname(), b.mname());
        assert_eq!(a.rname(), b.rname());
        for soa in [a, b] {
            assert_eq!(soa.refresh(), 10);
            assert_eq!(soa.retry(), 10);
            assert_eq!(soa.expire(), 10);
            assert_eq!(soa.minimum(), 10);
        }
    }

    #[tokio::test]
    async fn every_question_is_answered() {
        let handler = handler(&["abc123"], HOST);
        let answers = handler
            .answers(&[
                query(FQDN, RecordType::TXT),
                query("missing.example.com.", RecordType::TXT),
                query(FQDN, RecordType::NS),
            ])
            .await;
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].record_type(), RecordType::TXT);
        assert_eq!(answers[1].record_type(), RecordType::NS);
    }

    #[tokio::test]
    async fn oversized_txt_value_is_omitted() {
        let long = "x".repeat(MAX_TXT_LEN + 1);
        let handler = handler(&["abc123", long.as_str(), "def456"], HOST);
        let answers = handler.answers(&[query(FQDN, RecordType::TXT)]).await;

        assert_eq!(answers.len(), 2);
        assert_eq!(txt_strings(&answers[0]), vec!["abc123"]);
        assert_eq!(txt_strings(&answers[1]), vec!["def456"]);
    }

    #[tokio::test]
    async fn invalid_hostname_only_drops_ns_and_soa() {
        let bad_host = format!("{}.example.com", "a".repeat(64));
        let handler = handler(&["abc123"], &bad_host);
        let answers = handler
            .answers(&[
                query(FQDN, RecordType::SOA),
                query(FQDN, RecordType::NS),
                query(FQDN, RecordType::TXT),
            ])
            .await;

        assert_eq!(answers.len(), 1);
        assert_eq!(txt_strings(&answers[0]), vec!["abc123"]);
    }
}
