//! Classified units parsed from the engine's response stream.

use pglet_error::{PgletError, Result};

/// Transaction status reported by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not inside a transaction block.
    Idle,
    /// Inside a transaction block.
    InTransaction,
    /// Inside a failed transaction block; statements are rejected until
    /// the block ends.
    Failed,
}

impl TransactionStatus {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'I' => Ok(Self::Idle),
            b'T' => Ok(Self::InTransaction),
            b'E' => Ok(Self::Failed),
            other => Err(PgletError::protocol(format!(
                "unknown ReadyForQuery status byte 0x{other:02x}"
            ))),
        }
    }
}

/// Tagged fields of an `ErrorResponse` or `NoticeResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorFields {
    /// Severity tag (`ERROR`, `FATAL`, `WARNING`, `NOTICE`, ...).
    pub severity: String,
    /// SQLSTATE code.
    pub code: String,
    /// Primary human-readable message.
    pub message: String,
    /// Optional detail line.
    pub detail: Option<String>,
    /// Optional hint line.
    pub hint: Option<String>,
}

impl ErrorFields {
    /// Whether the severity marks this as fatal to the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity == "FATAL" || self.severity == "PANIC"
    }
}

/// One column of a `RowDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name.
    pub name: String,
    /// Type OID of the column.
    pub type_oid: u32,
    /// Type modifier.
    pub type_modifier: i32,
    /// Wire format: 0 = text, 1 = binary.
    pub format: i16,
}

/// An asynchronous `NotificationResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Backend process id of the notifying session.
    pub pid: u32,
    /// Channel name.
    pub channel: String,
    /// Payload string (may be empty).
    pub payload: String,
}

/// A classified unit from the response byte stream.
///
/// Variants the session runtime does not act on are passed through as
/// [`BackendMessage::Other`] so callers still see the complete stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// `T` — column descriptions for the rows that follow.
    RowDescription(Vec<FieldDescription>),
    /// `D` — one row; `None` entries are SQL NULL.
    DataRow(Vec<Option<Vec<u8>>>),
    /// `C` — statement finished, with its command tag.
    CommandComplete(String),
    /// `E` — error report.
    ErrorResponse(ErrorFields),
    /// `N` — notice report.
    NoticeResponse(ErrorFields),
    /// `A` — asynchronous notification.
    NotificationResponse(Notification),
    /// `Z` — engine is ready for the next query cycle.
    ReadyForQuery(TransactionStatus),
    /// `S` — runtime parameter changed.
    ParameterStatus { name: String, value: String },
    /// `I` — the query string was empty.
    EmptyQueryResponse,
    /// `1` — parse finished.
    ParseComplete,
    /// `2` — bind finished.
    BindComplete,
    /// `3` — close finished.
    CloseComplete,
    /// `n` — statement returns no data.
    NoData,
    /// Any other message, carried opaquely.
    Other { code: u8, body: Vec<u8> },
}

impl BackendMessage {
    /// Decode one complete frame: `code` is the type byte, `body` the
    /// payload after the length word.
    pub fn decode(code: u8, body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let msg = match code {
            b'T' => {
                let count = r.u16()?;
                let mut fields = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = r.cstring()?;
                    let _table_oid = r.u32()?;
                    let _column_attr = r.u16()?;
                    let type_oid = r.u32()?;
                    let _type_len = r.i16()?;
                    let type_modifier = r.i32()?;
                    let format = r.i16()?;
                    fields.push(FieldDescription {
                        name,
                        type_oid,
                        type_modifier,
                        format,
                    });
                }
                Self::RowDescription(fields)
            }
            b'D' => {
                let count = r.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let len = r.i32()?;
                    if len < 0 {
                        values.push(None);
                    } else {
                        values.push(Some(r.bytes(len as usize)?.to_vec()));
                    }
                }
                Self::DataRow(values)
            }
            b'C' => Self::CommandComplete(r.cstring()?),
            b'E' => Self::ErrorResponse(decode_error_fields(&mut r)?),
            b'N' => Self::NoticeResponse(decode_error_fields(&mut r)?),
            b'A' => {
                let pid = r.u32()?;
                let channel = r.cstring()?;
                let payload = r.cstring()?;
                Self::NotificationResponse(Notification {
                    pid,
                    channel,
                    payload,
                })
            }
            b'Z' => Self::ReadyForQuery(TransactionStatus::from_byte(r.u8()?)?),
            b'S' => {
                let name = r.cstring()?;
                let value = r.cstring()?;
                Self::ParameterStatus { name, value }
            }
            b'I' => Self::EmptyQueryResponse,
            b'1' => Self::ParseComplete,
            b'2' => Self::BindComplete,
            b'3' => Self::CloseComplete,
            b'n' => Self::NoData,
            other => Self::Other {
                code: other,
                body: body.to_vec(),
            },
        };
        Ok(msg)
    }
}

fn decode_error_fields(r: &mut Reader<'_>) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    loop {
        let tag = r.u8()?;
        if tag == 0 {
            break;
        }
        let value = r.cstring()?;
        match tag {
            b'S' => fields.severity = value,
            b'C' => fields.code = value,
            b'M' => fields.message = value,
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {}
        }
    }
    Ok(fields)
}

/// Cursor over one frame body. Every accessor fails with a protocol
/// error on underrun instead of panicking.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| PgletError::protocol("frame body underrun"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16> {
        let b = self.bytes(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstring(&mut self) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| PgletError::protocol("unterminated string in frame body"))?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }
}
