//! Request/response envelope spoken between clients and the coordinator.
//!
//! Every message is a [`RemotingCommand`]. Requests and responses share the shape; the
//! [`RESPONSE_FLAG`] bit tells them apart and `opaque` pairs a response with its request. Small
//! typed values travel as string key/values in `extFields` (see [`CustomHeader`]); payloads travel
//! as JSON in `body`.

use crate::error::{ProtocolError, ProtocolErrorExt};
use fxhash::FxHashMap;
use gts_domain::model::TransactionStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Set in `flag` on responses.
pub const RESPONSE_FLAG: i32 = 1;

/// `extFields` key carrying the group id.
pub const TX_GROUP_ID: &str = "txGroupId";
/// `extFields` key carrying the client id.
pub const CLIENT_ID: &str = "clientID";
/// `extFields` key carrying a numeric transaction status.
pub const STATUS: &str = "status";

/// Operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCode {
    HeartBeat,
    UnregisterClient,
    SaveTransGroup,
    AddTrans,
    FindTransGroupStatus,
    PreCommitTrans,
    CommitTrans,
    RollbackTransGroup,
}

impl RequestCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::HeartBeat => 34,
            Self::UnregisterClient => 35,
            Self::SaveTransGroup => 101,
            Self::AddTrans => 102,
            Self::FindTransGroupStatus => 103,
            Self::PreCommitTrans => 104,
            Self::CommitTrans => 105,
            Self::RollbackTransGroup => 106,
        }
    }

    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            34 => Some(Self::HeartBeat),
            35 => Some(Self::UnregisterClient),
            101 => Some(Self::SaveTransGroup),
            102 => Some(Self::AddTrans),
            103 => Some(Self::FindTransGroupStatus),
            104 => Some(Self::PreCommitTrans),
            105 => Some(Self::CommitTrans),
            106 => Some(Self::RollbackTransGroup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Success,
    SystemError,
}

impl ResponseCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::SystemError => 1,
        }
    }

    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::SystemError),
            _ => None,
        }
    }
}

/// The protocol envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotingCommand {
    /// A [`RequestCode`] on requests, a [`ResponseCode`] on responses.
    pub code: i32,
    #[serde(default)]
    pub flag: i32,
    /// Correlation id, echoed back on the response.
    #[serde(default)]
    pub opaque: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub ext_fields: FxHashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl RemotingCommand {
    #[must_use]
    pub fn request(code: RequestCode, opaque: i32) -> Self {
        Self { code: code.code(), opaque, ..Self::default() }
    }

    /// A response correlated with the request that carried `opaque`.
    #[must_use]
    pub fn response(code: ResponseCode, opaque: i32) -> Self {
        Self { code: code.code(), flag: RESPONSE_FLAG, opaque, ..Self::default() }
    }

    #[must_use]
    pub const fn is_response(&self) -> bool {
        self.flag & RESPONSE_FLAG == RESPONSE_FLAG
    }

    #[must_use]
    pub const fn request_code(&self) -> Option<RequestCode> {
        RequestCode::from_code(self.code)
    }

    #[must_use]
    pub const fn response_code(&self) -> Option<ResponseCode> {
        ResponseCode::from_code(self.code)
    }

    #[must_use = "The command is returned with the header applied."]
    pub fn with_header(mut self, header: &impl CustomHeader) -> Self {
        header.write(&mut self.ext_fields);
        self
    }

    #[must_use = "The command is returned with the remark applied."]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Attaches `payload` as the JSON body.
    pub fn with_body(mut self, payload: &impl Serialize) -> Result<Self, ProtocolError> {
        self.body = Some(serde_json::to_value(payload).context("Failed to encode body")?);
        Ok(self)
    }

    pub fn decode_header<H: CustomHeader>(&self) -> Result<H, ProtocolError> {
        H::read(&self.ext_fields)
    }

    /// Decodes the body; `None` when the command carries none.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<Option<T>, ProtocolError> {
        match &self.body {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(body) => T::deserialize(body).map(Some).context("Failed to decode body"),
        }
    }
}

/// A typed view over some `extFields` entries.
pub trait CustomHeader: Sized {
    fn read(fields: &FxHashMap<String, String>) -> Result<Self, ProtocolError>;

    fn write(&self, fields: &mut FxHashMap<String, String>);
}

fn required<'a>(
    fields: &'a FxHashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ProtocolError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ProtocolError::MissingHeader { name: name.into(), context: None })
}

/// Header of every request addressed to one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxGroupHeader {
    pub tx_group_id: String,
}

impl TxGroupHeader {
    pub fn new(tx_group_id: impl Into<String>) -> Self {
        Self { tx_group_id: tx_group_id.into() }
    }
}

impl CustomHeader for TxGroupHeader {
    fn read(fields: &FxHashMap<String, String>) -> Result<Self, ProtocolError> {
        Ok(Self::new(required(fields, TX_GROUP_ID)?))
    }

    fn write(&self, fields: &mut FxHashMap<String, String>) {
        fields.insert(TX_GROUP_ID.to_owned(), self.tx_group_id.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterClientHeader {
    pub client_id: String,
}

impl CustomHeader for UnregisterClientHeader {
    fn read(fields: &FxHashMap<String, String>) -> Result<Self, ProtocolError> {
        Ok(Self { client_id: required(fields, CLIENT_ID)?.to_owned() })
    }

    fn write(&self, fields: &mut FxHashMap<String, String>) {
        fields.insert(CLIENT_ID.to_owned(), self.client_id.clone());
    }
}

/// Response header of a group status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatusHeader {
    pub status: TransactionStatus,
}

impl CustomHeader for GroupStatusHeader {
    fn read(fields: &FxHashMap<String, String>) -> Result<Self, ProtocolError> {
        let raw = required(fields, STATUS)?;
        let status = raw
            .parse::<i32>()
            .ok()
            .and_then(|code| TransactionStatus::try_from(code).ok())
            .ok_or_else(|| ProtocolError::InvalidHeader {
                message: format!("'{raw}' is not a transaction status").into(),
                context: None,
            })?;
        Ok(Self { status })
    }

    fn write(&self, fields: &mut FxHashMap<String, String>) {
        fields.insert(STATUS.to_owned(), self.status.code().to_string());
    }
}

/// Body of a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatData {
    #[serde(rename = "clientID")]
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gts_domain::model::{TransactionGroup, TransactionItem, TransactionRole};
    use serde_json::json;

    #[test]
    fn test_codes_match_the_wire() {
        for code in [34, 35, 101, 102, 103, 104, 105, 106] {
            assert_eq!(RequestCode::from_code(code).map(RequestCode::code), Some(code));
        }
        assert_eq!(RequestCode::from_code(7), None);
        assert_eq!(ResponseCode::SystemError.code(), 1);
    }

    #[test]
    fn test_response_carries_flag_and_opaque() {
        let response = RemotingCommand::response(ResponseCode::Success, 42);
        assert!(response.is_response());
        assert_eq!(response.opaque, 42);
        assert!(!RemotingCommand::request(RequestCode::HeartBeat, 1).is_response());
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let command = RemotingCommand::request(RequestCode::AddTrans, 9)
            .with_header(&TxGroupHeader::new("G1"))
            .with_body(&TransactionItem::new("p1", TransactionRole::Participant))
            .unwrap();

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({
                "code": 102,
                "flag": 0,
                "opaque": 9,
                "extFields": { "txGroupId": "G1" },
                "body": { "taskKey": "p1", "role": 1, "status": 2 }
            })
        );
    }

    #[test]
    fn test_missing_header_is_reported_by_name() {
        let command = RemotingCommand::request(RequestCode::PreCommitTrans, 1);
        let err = command.decode_header::<TxGroupHeader>().unwrap_err();
        assert!(matches!(err, ProtocolError::MissingHeader { ref name, .. } if name == TX_GROUP_ID));
    }

    #[test]
    fn test_status_header_rejects_unknown_codes() {
        let mut command = RemotingCommand::response(ResponseCode::Success, 1);
        command.ext_fields.insert(STATUS.to_owned(), "9".to_owned());
        assert!(matches!(
            command.decode_header::<GroupStatusHeader>(),
            Err(ProtocolError::InvalidHeader { .. })
        ));

        let command = command.with_header(&GroupStatusHeader { status: TransactionStatus::Committed });
        assert_eq!(command.ext_fields.get(STATUS).map(String::as_str), Some("1"));
        assert_eq!(
            command.decode_header::<GroupStatusHeader>().unwrap().status,
            TransactionStatus::Committed
        );
    }

    #[test]
    fn test_absent_or_null_body_decodes_to_none() {
        let mut command = RemotingCommand::request(RequestCode::SaveTransGroup, 1);
        assert_eq!(command.decode_body::<TransactionGroup>().unwrap(), None);

        command.body = Some(serde_json::Value::Null);
        assert_eq!(command.decode_body::<TransactionGroup>().unwrap(), None);

        command.body = Some(json!({ "id": 5 }));
        assert!(matches!(
            command.decode_body::<TransactionGroup>(),
            Err(ProtocolError::Body { .. })
        ));
    }
}
