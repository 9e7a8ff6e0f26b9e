//! `splice_command` variants, tagged by `CommandType` in the enclosing
//! [`super::SpliceInfoSection`].

use bytes::{BufMut, BytesMut};

use crate::error::{Result, VdkError};
use crate::utils::bits::{pack_pts, unpack_pts};

pub const COMMAND_TYPE_SPLICE_NULL: u8 = 0x00;
pub const COMMAND_TYPE_SPLICE_SCHEDULE: u8 = 0x04;
pub const COMMAND_TYPE_SPLICE_INSERT: u8 = 0x05;
pub const COMMAND_TYPE_TIME_SIGNAL: u8 = 0x06;
pub const COMMAND_TYPE_BANDWIDTH_RESERVATION: u8 = 0x07;
pub const COMMAND_TYPE_PRIVATE: u8 = 0xFF;

/// A splice time or break duration packed via the shared 33-bit PTS routine, with its own
/// leading flag bit and reserved bits occupying the unused high 7 bits of the first byte.
fn read_splice_time(data: &[u8]) -> Result<Option<u64>> {
    if data.is_empty() {
        return Err(VdkError::BufferUnderflow("splice time truncated".into()));
    }
    let time_specified = data[0] & 0x80 != 0;
    if !time_specified {
        return Ok(None);
    }
    if data.len() < 5 {
        return Err(VdkError::BufferUnderflow("splice time truncated".into()));
    }
    let mut bytes = [0u8; 5];
    bytes.copy_from_slice(&data[..5]);
    Ok(Some(unpack_pts(&bytes)))
}

fn write_splice_time(buf: &mut BytesMut, ticks: Option<u64>) -> Result<()> {
    match ticks {
        Some(ticks) => {
            let mut packed = pack_pts(ticks)?;
            packed[0] |= 0x80 | 0x7E; // time_specified=1, reserved=all 1
            buf.put_slice(&packed);
        }
        None => buf.put_u8(0x7F), // time_specified=0, reserved=all 1
    }
    Ok(())
}

fn splice_time_len(ticks: Option<u64>) -> usize {
    if ticks.is_some() {
        5
    } else {
        1
    }
}

/// `break_duration()`: `[auto_return:1][reserved:6][ticks:33]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakDuration {
    pub auto_return: bool,
    pub ticks: u64,
}

impl BreakDuration {
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(VdkError::BufferUnderflow("break_duration truncated".into()));
        }
        let mut bytes = [0u8; 5];
        bytes.copy_from_slice(&data[..5]);
        Ok(Self {
            auto_return: bytes[0] & 0x80 != 0,
            ticks: unpack_pts(&bytes),
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let mut packed = pack_pts(self.ticks)?;
        packed[0] |= 0x7E; // reserved bits set to 1
        if self.auto_return {
            packed[0] |= 0x80;
        }
        buf.put_slice(&packed);
        Ok(())
    }
}

/// `splice_insert()` command (`CommandType::SpliceInsert`, 0x05).
///
/// Component-level splicing (`program_splice_flag = 0`) is not implemented; this type always
/// represents a program-level splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInsert {
    pub event_id: u32,
    pub cancel: bool,
    pub out_of_network: bool,
    pub immediate: bool,
    pub event_id_compliance: bool,
    /// Presentation timestamp the splice should occur at, in 90 kHz ticks. Present only when
    /// not cancelling and not immediate.
    pub splice_time: Option<u64>,
    pub duration: Option<BreakDuration>,
    pub program_id: u16,
    pub avail_num: u8,
    pub avail_expected: u8,
}

impl SpliceInsert {
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(VdkError::BufferUnderflow("splice_insert truncated".into()));
        }
        let event_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let cancel = data[4] & 0x80 != 0;

        if cancel {
            return Ok(Self {
                event_id,
                cancel: true,
                out_of_network: false,
                immediate: false,
                event_id_compliance: false,
                splice_time: None,
                duration: None,
                program_id: 0,
                avail_num: 0,
                avail_expected: 0,
            });
        }

        if data.len() < 6 {
            return Err(VdkError::BufferUnderflow("splice_insert truncated".into()));
        }
        let flags = data[5];
        let out_of_network = flags & 0x80 != 0;
        let program_splice = flags & 0x40 != 0;
        let duration_flag = flags & 0x20 != 0;
        let immediate = flags & 0x10 != 0;
        let event_id_compliance = flags & 0x08 != 0;
        if !program_splice {
            return Err(VdkError::Unsupported(
                "splice_insert component-level splicing is not supported".into(),
            ));
        }

        let mut pos = 6;
        let splice_time = if !immediate {
            let ts = read_splice_time(&data[pos..])?;
            pos += splice_time_len(ts);
            ts
        } else {
            None
        };

        let duration = if duration_flag {
            let d = BreakDuration::decode(&data[pos..])?;
            pos += 5;
            Some(d)
        } else {
            None
        };

        if data.len() < pos + 4 {
            return Err(VdkError::BufferUnderflow("splice_insert truncated".into()));
        }
        let program_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let avail_num = data[pos + 2];
        let avail_expected = data[pos + 3];

        Ok(Self {
            event_id,
            cancel: false,
            out_of_network,
            immediate,
            event_id_compliance,
            splice_time,
            duration,
            program_id,
            avail_num,
            avail_expected,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.event_id);
        if self.cancel {
            buf.put_u8(0xFF);
            return Ok(());
        }
        buf.put_u8(0x7F); // reserved bits set to 1

        if self.immediate && self.splice_time.is_some() {
            return Err(VdkError::InvariantViolation(
                "splice_insert cannot carry a splice_time when immediate".into(),
            ));
        }

        let mut flags = 0b0100_1111u8; // program_splice=1, reserved(4)=1111
        if self.out_of_network {
            flags |= 0x80;
        }
        if self.duration.is_some() {
            flags |= 0x20;
        }
        if self.immediate {
            flags |= 0x10;
        }
        if self.event_id_compliance {
            flags |= 0x08;
        }
        buf.put_u8(flags);

        if !self.immediate {
            write_splice_time(buf, self.splice_time)?;
        }
        if let Some(duration) = &self.duration {
            duration.encode(buf)?;
        }

        buf.put_u16(self.program_id);
        buf.put_u8(self.avail_num);
        buf.put_u8(self.avail_expected);
        Ok(())
    }
}

/// One event inside a `splice_schedule()` command. Always program-level, per
/// [`SpliceInsert`]'s restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub event_id: u32,
    pub cancel: bool,
    pub out_of_network: bool,
    pub utc_splice_time: u32,
    pub duration: Option<BreakDuration>,
    pub program_id: u16,
    pub avail_num: u8,
    pub avail_expected: u8,
}

impl ScheduledEvent {
    fn decode(data: &[u8], consumed: &mut usize) -> Result<Self> {
        if data.len() < 5 {
            return Err(VdkError::BufferUnderflow("splice_schedule event truncated".into()));
        }
        let event_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let cancel = data[4] & 0x80 != 0;
        if cancel {
            *consumed += 5;
            return Ok(Self {
                event_id,
                cancel: true,
                out_of_network: false,
                utc_splice_time: 0,
                duration: None,
                program_id: 0,
                avail_num: 0,
                avail_expected: 0,
            });
        }

        if data.len() < 10 {
            return Err(VdkError::BufferUnderflow("splice_schedule event truncated".into()));
        }
        let flags = data[5];
        let out_of_network = flags & 0x80 != 0;
        let program_splice = flags & 0x40 != 0;
        let duration_flag = flags & 0x20 != 0;
        if !program_splice {
            return Err(VdkError::Unsupported(
                "splice_schedule component-level splicing is not supported".into(),
            ));
        }
        let utc_splice_time = u32::from_be_bytes([data[6], data[7], data[8], data[9]]);

        // Local cursor into this event's own slice, distinct from the caller's absolute
        // `consumed`, which the outer loop uses to re-slice the whole splice_schedule buffer.
        let mut local = 10usize;

        let duration = if duration_flag {
            let d = BreakDuration::decode(&data[local..])?;
            local += 5;
            Some(d)
        } else {
            None
        };

        if data.len() < local + 4 {
            return Err(VdkError::BufferUnderflow("splice_schedule event truncated".into()));
        }
        let program_id = u16::from_be_bytes([data[local], data[local + 1]]);
        let avail_num = data[local + 2];
        let avail_expected = data[local + 3];
        local += 4;

        *consumed += local;

        Ok(Self {
            event_id,
            cancel: false,
            out_of_network,
            utc_splice_time,
            duration,
            program_id,
            avail_num,
            avail_expected,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.event_id);
        if self.cancel {
            buf.put_u8(0xFF);
            return Ok(());
        }
        buf.put_u8(0x7F);

        let mut flags = 0b0100_0000u8; // program_splice=1
        if self.out_of_network {
            flags |= 0x80;
        }
        if self.duration.is_some() {
            flags |= 0x20;
        }
        flags |= 0x1F; // reserved bits set to 1
        buf.put_u8(flags);
        buf.put_u32(self.utc_splice_time);
        if let Some(duration) = &self.duration {
            duration.encode(buf)?;
        }
        buf.put_u16(self.program_id);
        buf.put_u8(self.avail_num);
        buf.put_u8(self.avail_expected);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSignal {
    pub splice_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateCommand {
    pub identifier: u32,
    pub data: Vec<u8>,
}

/// A SCTE-35 `splice_command`, dispatched by `CommandType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SpliceNull,
    SpliceSchedule(Vec<ScheduledEvent>),
    SpliceInsert(SpliceInsert),
    TimeSignal(TimeSignal),
    BandwidthReservation,
    Private(PrivateCommand),
}

impl Command {
    pub fn command_type(&self) -> u8 {
        match self {
            Command::SpliceNull => COMMAND_TYPE_SPLICE_NULL,
            Command::SpliceSchedule(_) => COMMAND_TYPE_SPLICE_SCHEDULE,
            Command::SpliceInsert(_) => COMMAND_TYPE_SPLICE_INSERT,
            Command::TimeSignal(_) => COMMAND_TYPE_TIME_SIGNAL,
            Command::BandwidthReservation => COMMAND_TYPE_BANDWIDTH_RESERVATION,
            Command::Private(_) => COMMAND_TYPE_PRIVATE,
        }
    }

    pub fn decode(command_type: u8, data: &[u8]) -> Result<Self> {
        log::trace!("decoding splice command type {:#04x}, {} bytes", command_type, data.len());
        match command_type {
            COMMAND_TYPE_SPLICE_NULL => {
                if !data.is_empty() {
                    return Err(VdkError::InvariantViolation(
                        "splice_null command carries a non-empty payload".into(),
                    ));
                }
                Ok(Command::SpliceNull)
            }
            COMMAND_TYPE_BANDWIDTH_RESERVATION => {
                if !data.is_empty() {
                    return Err(VdkError::InvariantViolation(
                        "bandwidth_reservation command carries a non-empty payload".into(),
                    ));
                }
                Ok(Command::BandwidthReservation)
            }
            COMMAND_TYPE_TIME_SIGNAL => Ok(Command::TimeSignal(TimeSignal {
                splice_time: read_splice_time(data)?,
            })),
            COMMAND_TYPE_SPLICE_INSERT => Ok(Command::SpliceInsert(SpliceInsert::decode(data)?)),
            COMMAND_TYPE_SPLICE_SCHEDULE => {
                if data.is_empty() {
                    return Err(VdkError::BufferUnderflow("splice_schedule truncated".into()));
                }
                let count = data[0] as usize;
                let mut consumed = 1;
                let mut events = Vec::with_capacity(count);
                for _ in 0..count {
                    events.push(ScheduledEvent::decode(&data[consumed..], &mut consumed)?);
                }
                Ok(Command::SpliceSchedule(events))
            }
            COMMAND_TYPE_PRIVATE => {
                if data.len() < 4 {
                    return Err(VdkError::BufferUnderflow("private_command truncated".into()));
                }
                let identifier = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Command::Private(PrivateCommand {
                    identifier,
                    data: data[4..].to_vec(),
                }))
            }
            other => Err(VdkError::Unsupported(format!("unknown splice command type {:#04x}", other))),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        match self {
            Command::SpliceNull | Command::BandwidthReservation => {}
            Command::TimeSignal(ts) => write_splice_time(&mut buf, ts.splice_time)?,
            Command::SpliceInsert(insert) => insert.encode(&mut buf)?,
            Command::SpliceSchedule(events) => {
                if events.len() > 255 {
                    return Err(VdkError::FieldOutOfRange {
                        field: "splice_schedule.event_count",
                        max_bits: 8,
                        value: events.len() as u64,
                    });
                }
                buf.put_u8(events.len() as u8);
                for event in events {
                    event.encode(&mut buf)?;
                }
            }
            Command::Private(private) => {
                buf.put_u32(private.identifier);
                buf.put_slice(&private.data);
            }
        }
        Ok(buf.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signal_round_trips_with_ticks() {
        let command = Command::TimeSignal(TimeSignal {
            splice_time: Some(0x0_72BD_0050),
        });
        let encoded = command.encode().unwrap();
        assert_eq!(encoded.len(), 5);
        let decoded = Command::decode(COMMAND_TYPE_TIME_SIGNAL, &encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_time_signal_round_trips_without_ticks() {
        let command = Command::TimeSignal(TimeSignal { splice_time: None });
        let encoded = command.encode().unwrap();
        assert_eq!(encoded.len(), 1);
        let decoded = Command::decode(COMMAND_TYPE_TIME_SIGNAL, &encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_splice_insert_round_trips() {
        let command = Command::SpliceInsert(SpliceInsert {
            event_id: 0x4800008F,
            cancel: false,
            out_of_network: true,
            immediate: false,
            event_id_compliance: true,
            splice_time: Some(0x07369C02E),
            duration: Some(BreakDuration {
                auto_return: true,
                ticks: 0x00052CCF5,
            }),
            program_id: 0,
            avail_num: 0,
            avail_expected: 0,
        });
        let encoded = command.encode().unwrap();
        assert_eq!(encoded.len(), 20);
        let decoded = Command::decode(COMMAND_TYPE_SPLICE_INSERT, &encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_splice_insert_cancel_is_minimal() {
        let command = Command::SpliceInsert(SpliceInsert {
            event_id: 1,
            cancel: true,
            out_of_network: false,
            immediate: false,
            event_id_compliance: false,
            splice_time: None,
            duration: None,
            program_id: 0,
            avail_num: 0,
            avail_expected: 0,
        });
        let encoded = command.encode().unwrap();
        assert_eq!(encoded.len(), 5);
        let decoded = Command::decode(COMMAND_TYPE_SPLICE_INSERT, &encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_splice_insert_rejects_immediate_with_splice_time() {
        let command = Command::SpliceInsert(SpliceInsert {
            event_id: 1,
            cancel: false,
            out_of_network: false,
            immediate: true,
            event_id_compliance: false,
            splice_time: Some(1),
            duration: None,
            program_id: 0,
            avail_num: 0,
            avail_expected: 0,
        });
        assert!(command.encode().is_err());
    }

    #[test]
    fn test_splice_null_rejects_unknown_trailing_bytes() {
        assert!(Command::decode(COMMAND_TYPE_SPLICE_NULL, &[0x00]).is_err());
    }

    #[test]
    fn test_splice_schedule_round_trips() {
        let command = Command::SpliceSchedule(vec![ScheduledEvent {
            event_id: 7,
            cancel: false,
            out_of_network: true,
            utc_splice_time: 0x1234_5678,
            duration: Some(BreakDuration {
                auto_return: false,
                ticks: 90_000,
            }),
            program_id: 99,
            avail_num: 1,
            avail_expected: 1,
        }]);
        let encoded = command.encode().unwrap();
        let decoded = Command::decode(COMMAND_TYPE_SPLICE_SCHEDULE, &encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_private_command_round_trips() {
        let command = Command::Private(PrivateCommand {
            identifier: 0x4A4A4A4A,
            data: vec![1, 2, 3],
        });
        let encoded = command.encode().unwrap();
        let decoded = Command::decode(COMMAND_TYPE_PRIVATE, &encoded).unwrap();
        assert_eq!(decoded, command);
    }
}
