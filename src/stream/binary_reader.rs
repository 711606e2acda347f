use crate::error::{Error, Result};
use crate::plist::Plist;
use crate::stream::MAX_DEPTH;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::{tag, take};
use nom::combinator::map;
use nom::multi::count;
use nom::number::complete::{be_f32, be_f64, be_i64, be_i128, be_u8, be_u16, be_u32, be_u64};
use tracing::{debug, warn};

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 32;
/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
const APPLE_EPOCH_OFFSET: f64 = 978_307_200.0;

#[derive(Debug)]
struct Trailer {
    offset_int_size: u8,
    object_ref_size: u8,
    num_objects: u64,
    top_object: u64,
    offset_table_start: u64,
}

impl Trailer {
    fn validate(&self, file_len: usize) -> Result<()> {
        if !matches!(self.offset_int_size, 1 | 2 | 4 | 8) {
            return Err(Error::Parse(format!(
                "invalid offset size {}",
                self.offset_int_size
            )));
        }
        if !matches!(self.object_ref_size, 1 | 2 | 4 | 8) {
            return Err(Error::Parse(format!(
                "invalid object reference size {}",
                self.object_ref_size
            )));
        }
        if self.num_objects == 0 || self.top_object >= self.num_objects {
            return Err(Error::Parse(format!(
                "top object {} outside of {} objects",
                self.top_object, self.num_objects
            )));
        }
        let table_len = self
            .num_objects
            .checked_mul(self.offset_int_size as u64)
            .ok_or_else(|| Error::parse("offset table too large"))?;
        let table_end = self
            .offset_table_start
            .checked_add(table_len)
            .ok_or_else(|| Error::parse("offset table too large"))?;
        if self.offset_table_start < HEADER_LEN as u64 || table_end > (file_len - TRAILER_LEN) as u64
        {
            return Err(Error::parse("offset table outside of file"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct BinaryReader<'a> {
    /// Object table: everything between the header and the offset table.
    objects: &'a [u8],
    offsets: Vec<u64>,
    object_ref_size: u8,
    /// Indices of the containers currently being decoded.
    stack: Vec<u64>,
    /// Objects still allowed to be decoded. Without shared containers every
    /// object after the top one costs at least one reference byte, so the
    /// file length bounds an honest tree.
    budget: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Plist> {
        let (_, version) = Self::parse_bplist_header(data)?;
        if version != b"00" {
            return Err(Error::UnsupportedVersion(
                String::from_utf8_lossy(version).into_owned(),
            ));
        }
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::parse("truncated binary plist"));
        }
        let (_, trailer) = Self::parse_trailer(&data[data.len() - TRAILER_LEN..])?;
        trailer.validate(data.len())?;
        let offset_table_start = trailer.offset_table_start as usize;
        let (_, offsets) = Self::parse_offset_table(
            &data[offset_table_start..data.len() - TRAILER_LEN],
            trailer.num_objects as usize,
            trailer.offset_int_size,
        )?;
        if let Some(bad) = offsets
            .iter()
            .find(|offset| **offset < HEADER_LEN as u64 || **offset >= trailer.offset_table_start)
        {
            return Err(Error::Parse(format!("object offset {} outside object table", bad)));
        }
        let mut reader = BinaryReader {
            objects: &data[..offset_table_start],
            offsets,
            object_ref_size: trailer.object_ref_size,
            stack: vec![],
            budget: data.len(),
        };
        let value = reader.parse_object(trailer.top_object)?;
        debug!(objects = trailer.num_objects, "decoded binary plist");
        Ok(value)
    }

    fn parse_bplist_header(input: &[u8]) -> IResult<&[u8], &[u8]> {
        let (input, _) = tag("bplist").parse(input)?;
        take(2usize).parse(input)
    }

    fn parse_trailer(input: &[u8]) -> IResult<&[u8], Trailer> {
        let (
            input,
            (_, _, offset_int_size, object_ref_size, num_objects, top_object, offset_table_start),
        ) = (
            take(5usize), // unused
            be_u8,        // sort version
            be_u8,
            be_u8,
            be_u64,
            be_u64,
            be_u64,
        )
            .parse(input)?;
        Ok((
            input,
            Trailer {
                offset_int_size,
                object_ref_size,
                num_objects,
                top_object,
                offset_table_start,
            },
        ))
    }

    fn parse_sized_uint(input: &[u8], size: u8) -> IResult<&[u8], u64> {
        match size {
            1 => map(be_u8, u64::from).parse(input),
            2 => map(be_u16, u64::from).parse(input),
            4 => map(be_u32, u64::from).parse(input),
            8 => be_u64.parse(input),
            _ => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Switch,
            ))),
        }
    }

    fn parse_offset_table(input: &[u8], counts: usize, int_size: u8) -> IResult<&[u8], Vec<u64>> {
        count(|i| Self::parse_sized_uint(i, int_size), counts).parse(input)
    }

    // marker byte: object type in the high nibble, size or count in the low one
    fn parse_header(input: &[u8]) -> IResult<&[u8], (u8, u8)> {
        let (input, header) = be_u8.parse(input)?;
        Ok((input, (header >> 4, header & 0x0F)))
    }

    /// Length in the low nibble, or a following integer object when it is `0xF`.
    fn parse_count(input: &[u8], extra_info: u8) -> Result<(&[u8], usize)> {
        if extra_info != 0x0F {
            return Ok((input, extra_info as usize));
        }
        let (input, (object_type, size_info)) = Self::parse_header(input)?;
        if object_type != 0x1 || size_info > 3 {
            return Err(Error::parse("invalid length marker"));
        }
        let (input, len) = Self::parse_sized_uint(input, 1 << size_info)?;
        let len = usize::try_from(len).map_err(|_| Error::parse("length too large"))?;
        Ok((input, len))
    }

    fn parse_bool(extra_info: u8) -> Result<Plist> {
        match extra_info {
            0x08 => Ok(Plist::Boolean(false)),
            0x09 => Ok(Plist::Boolean(true)),
            0x00 => Err(Error::parse("null objects are not supported")),
            0x0F => Err(Error::parse("fill byte in place of an object")),
            _ => Err(Error::Parse(format!("invalid simple marker {:#04x}", extra_info))),
        }
    }

    fn parse_integer(input: &[u8], extra_info: u8) -> Result<Plist> {
        let (_, value) = match extra_info {
            0..=2 => {
                let size = 1 << extra_info;
                run(map(|i| Self::parse_sized_uint(i, size), i128::from).parse(input))?
            }
            3 => run(map(be_i64, i128::from).parse(input))?,
            4 => run(be_i128.parse(input))?,
            _ => {
                return Err(Error::Parse(format!(
                    "invalid integer size {}",
                    1u32 << extra_info
                )));
            }
        };
        Ok(Plist::Integer(value))
    }

    fn parse_float(input: &[u8], extra_info: u8) -> Result<Plist> {
        let (_, value) = match extra_info {
            2 => run(map(be_f32, f64::from).parse(input))?,
            3 => run(be_f64.parse(input))?,
            _ => return Err(Error::Parse(format!("invalid real size {}", 1u32 << extra_info))),
        };
        Ok(Plist::Float(value))
    }

    fn parse_date(input: &[u8], extra_info: u8) -> Result<Plist> {
        if extra_info != 3 {
            return Err(Error::parse("invalid date marker"));
        }
        let (_, seconds_since_2001) = run(be_f64.parse(input))?;
        apple_time_to_datetime(seconds_since_2001)
            .map(Plist::Date)
            .ok_or_else(|| Error::Parse(format!("date {} out of range", seconds_since_2001)))
    }

    fn parse_data(input: &[u8], extra_info: u8) -> Result<Plist> {
        let (input, len) = Self::parse_count(input, extra_info)?;
        let (_, data) = run(take(len).parse(input))?;
        Ok(Plist::Data(data.to_vec()))
    }

    fn parse_ascii_string(input: &[u8], extra_info: u8) -> Result<Plist> {
        let (input, len) = Self::parse_count(input, extra_info)?;
        let (_, bytes) = run(take(len).parse(input))?;
        if !bytes.is_ascii() {
            return Err(Error::parse("non-ASCII byte in ASCII string"));
        }
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::parse("invalid UTF-8 in string"))?;
        Ok(Plist::String(value))
    }

    fn parse_utf16_string(input: &[u8], extra_info: u8) -> Result<Plist> {
        let (input, len) = Self::parse_count(input, extra_info)?;
        let byte_len = len
            .checked_mul(2)
            .ok_or_else(|| Error::parse("string too long"))?;
        let (_, bytes) = run(take(byte_len).parse(input))?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let value =
            String::from_utf16(&units).map_err(|_| Error::parse("invalid UTF-16 in string"))?;
        Ok(Plist::String(value))
    }

    fn parse_uid(input: &[u8], extra_info: u8) -> Result<Plist> {
        let len = extra_info as usize + 1;
        if len > 8 {
            return Err(Error::Parse(format!("invalid uid size {}", len)));
        }
        let (_, bytes) = run(take(len).parse(input))?;
        let value = bytes
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        Ok(Plist::Uid(value))
    }

    fn parse_refs(&self, input: &'a [u8], counts: usize) -> Result<(&'a [u8], Vec<u64>)> {
        let size = self.object_ref_size;
        run(count(|i| Self::parse_sized_uint(i, size), counts).parse(input))
    }

    fn parse_array(&mut self, input: &'a [u8], extra_info: u8) -> Result<Plist> {
        let (input, counts) = Self::parse_count(input, extra_info)?;
        let (_, refs) = self.parse_refs(input, counts)?;
        let mut array = Vec::with_capacity(refs.len());
        for object_ref in refs {
            array.push(self.parse_object(object_ref)?);
        }
        Ok(Plist::Array(array))
    }

    fn parse_dict(&mut self, input: &'a [u8], extra_info: u8) -> Result<Plist> {
        let (input, counts) = Self::parse_count(input, extra_info)?;
        // all key refs come first, then all value refs
        let (input, key_refs) = self.parse_refs(input, counts)?;
        let (_, value_refs) = self.parse_refs(input, counts)?;
        let mut dict = IndexMap::with_capacity(counts);
        for (key_ref, value_ref) in key_refs.into_iter().zip(value_refs) {
            let key = match self.parse_object(key_ref)? {
                Plist::String(key) => key,
                other => {
                    return Err(Error::Parse(format!(
                        "dictionary key is a {}, not a string",
                        other.kind()
                    )));
                }
            };
            let value = self.parse_object(value_ref)?;
            if dict.insert(key.clone(), value).is_some() {
                warn!(key = %key, "duplicate dictionary key, keeping the last value");
            }
        }
        Ok(Plist::Dictionary(dict))
    }

    fn parse_container(
        &mut self,
        index: u64,
        object_type: u8,
        input: &'a [u8],
        extra_info: u8,
    ) -> Result<Plist> {
        if self.stack.contains(&index) {
            return Err(Error::Parse(format!("object {} contains itself", index)));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(Error::parse("containers nested too deeply"));
        }
        self.stack.push(index);
        let result = if object_type == 0xA {
            self.parse_array(input, extra_info)
        } else {
            self.parse_dict(input, extra_info)
        };
        self.stack.pop();
        result
    }

    fn parse_object(&mut self, index: u64) -> Result<Plist> {
        self.budget = self
            .budget
            .checked_sub(1)
            .ok_or_else(|| Error::parse("object graph too large"))?;
        let offset = usize::try_from(index)
            .ok()
            .and_then(|i| self.offsets.get(i))
            .copied()
            .ok_or_else(|| Error::Parse(format!("object reference {} out of range", index)))?;
        let objects = self.objects;
        let input = &objects[offset as usize..];
        let (input, (object_type, extra_info)) = Self::parse_header(input)?;
        match object_type {
            0x0 => Self::parse_bool(extra_info),
            0x1 => Self::parse_integer(input, extra_info),
            0x2 => Self::parse_float(input, extra_info),
            0x3 => Self::parse_date(input, extra_info),
            0x4 => Self::parse_data(input, extra_info),
            0x5 => Self::parse_ascii_string(input, extra_info),
            0x6 => Self::parse_utf16_string(input, extra_info),
            0x8 => Self::parse_uid(input, extra_info),
            0xA | 0xD => self.parse_container(index, object_type, input, extra_info),
            0xC => Err(Error::parse("sets are not supported")),
            _ => Err(Error::Parse(format!(
                "unknown object marker {:#04x}",
                (object_type << 4) | extra_info
            ))),
        }
    }
}

/// Pins nom's error type so `?` can convert into [`Error`].
fn run<'a, O>(result: IResult<&'a [u8], O>) -> Result<(&'a [u8], O)> {
    result.map_err(Error::from)
}

fn apple_time_to_datetime(seconds_since_2001: f64) -> Option<DateTime<Utc>> {
    let unix = seconds_since_2001 + APPLE_EPOCH_OFFSET;
    if !unix.is_finite() || unix.abs() > 1e14 {
        return None;
    }
    let whole = unix.floor();
    let mut secs = whole as i64;
    let mut nanos = ((unix - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    DateTime::from_timestamp(secs, nanos)
}
