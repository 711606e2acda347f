use crate::error::{Error, Result};
use crate::plist::Plist;
use crate::stream::MAX_DEPTH;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until};
use nom::character::complete::{multispace0, multispace1};
use nom::combinator::{cut, eof, map, opt, value};
use nom::error::ErrorKind;
use nom::multi::many0;
use nom::sequence::{delimited, terminated};
use tracing::{debug, warn};

pub struct XmlReader {}
impl XmlReader {
    fn failure(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
        nom::Err::Failure(nom::error::Error::new(input, kind))
    }

    fn parse_comment(input: &str) -> IResult<&str, &str> {
        delimited(tag("<!--"), take_until("-->"), tag("-->")).parse(input)
    }

    /// Skips whitespace and comments.
    fn skip(input: &str) -> IResult<&str, ()> {
        value((), many0(alt((multispace1, Self::parse_comment)))).parse(input)
    }

    fn parse_doctype(input: &str) -> IResult<&str, ()> {
        value(
            (),
            (
                tag("<!DOCTYPE"),
                is_not("[>"),
                opt((tag("["), take_until("]"), tag("]"))),
                opt(is_not(">")),
                tag(">"),
            ),
        )
        .parse(input)
    }

    // BOM, <?xml ...?>, <!DOCTYPE ...> and the opening <plist ...> tag
    fn parse_prolog(input: &str) -> IResult<&str, ()> {
        let (input, _) = opt(tag("\u{feff}")).parse(input)?;
        let (input, _) = Self::skip(input)?;
        let (input, _) = opt(delimited(tag("<?xml"), take_until("?>"), tag("?>"))).parse(input)?;
        let (input, _) = Self::skip(input)?;
        let (input, _) = opt(Self::parse_doctype).parse(input)?;
        let (input, _) = Self::skip(input)?;
        let (input, _) = (tag("<plist"), opt(is_not(">")), tag(">")).parse(input)?;
        Ok((input, ()))
    }

    fn parse_entity(input: &str) -> IResult<&str, char> {
        let (rest, name) = delimited(tag("&"), is_not(";<&"), tag(";")).parse(input)?;
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        match decoded {
            Some(c) => Ok((rest, c)),
            None => Err(Self::failure(input, ErrorKind::Escaped)),
        }
    }

    /// Character data up to the next tag, with entities and CDATA sections
    /// resolved and comments dropped.
    fn parse_text(input: &str) -> IResult<&str, String> {
        let mut text = String::new();
        let mut input = input;
        loop {
            if let Some(rest) = input.strip_prefix("<![CDATA[") {
                let (rest, raw) = cut(terminated(take_until("]]>"), tag("]]>"))).parse(rest)?;
                text.push_str(raw);
                input = rest;
            } else if input.starts_with("<!--") {
                let (rest, _) = cut(Self::parse_comment).parse(input)?;
                input = rest;
            } else if input.starts_with('&') {
                let (rest, c) = Self::parse_entity(input)?;
                text.push(c);
                input = rest;
            } else if input.is_empty() || input.starts_with('<') {
                return Ok((input, text));
            } else {
                let (rest, raw) = is_not("<&").parse(input)?;
                text.push_str(raw);
                input = rest;
            }
        }
    }

    /// `<name>` or the empty form `<name/>`, whitespace allowed before the
    /// closing bracket. Yields true for the empty form.
    fn open_tag<'a>(input: &'a str, name: &str) -> IResult<&'a str, bool> {
        let (input, _) = (tag("<"), tag(name), multispace0).parse(input)?;
        alt((value(true, tag("/>")), value(false, tag(">")))).parse(input)
    }

    fn close_tag<'a>(input: &'a str, name: &str) -> IResult<&'a str, ()> {
        value((), (tag("</"), tag(name), multispace0, tag(">"))).parse(input)
    }

    /// `<name>text</name>` or `<name/>`.
    fn parse_text_element<'a>(input: &'a str, name: &str) -> IResult<&'a str, String> {
        let (input, empty) = Self::open_tag(input, name)?;
        if empty {
            return Ok((input, String::new()));
        }
        let (input, text) = Self::parse_text(input)?;
        let (input, _) = Self::close_tag(input, name)?;
        Ok((input, text))
    }

    fn opens(input: &str, name: &str) -> bool {
        input
            .strip_prefix('<')
            .and_then(|rest| rest.strip_prefix(name))
            .is_some_and(|rest| {
                rest.starts_with(['>', '/']) || rest.starts_with(|c: char| c.is_ascii_whitespace())
            })
    }

    fn parse_string(input: &str) -> IResult<&str, String> {
        Self::parse_text_element(input, "string")
    }

    fn parse_float(input: &str) -> IResult<&str, f64> {
        let (rest, text) = Self::parse_text_element(input, "real")?;
        let number = text
            .trim()
            .parse()
            .map_err(|_| Self::failure(input, ErrorKind::Float))?;
        Ok((rest, number))
    }

    fn parse_date(input: &str) -> IResult<&str, DateTime<Utc>> {
        let (rest, text) = Self::parse_text_element(input, "date")?;
        let date = parse_date_text(text.trim()).ok_or_else(|| Self::failure(input, ErrorKind::Verify))?;
        Ok((rest, date))
    }

    fn parse_data(input: &str) -> IResult<&str, Vec<u8>> {
        let (rest, text) = Self::parse_text_element(input, "data")?;
        let encoded: String = text.split_ascii_whitespace().collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|_| Self::failure(input, ErrorKind::Verify))?;
        Ok((rest, bytes))
    }

    fn parse_integer(input: &str) -> IResult<&str, i128> {
        let (rest, text) = Self::parse_text_element(input, "integer")?;
        let number = parse_int(text.trim()).ok_or_else(|| Self::failure(input, ErrorKind::Digit))?;
        Ok((rest, number))
    }

    /// `<true/>`, or `<true></true>` with nothing but whitespace inside.
    fn parse_boolean<'a>(input: &'a str, name: &str) -> IResult<&'a str, ()> {
        let (input, empty) = Self::open_tag(input, name)?;
        if empty {
            return Ok((input, ()));
        }
        let (input, _) = Self::skip(input)?;
        Self::close_tag(input, name)
    }

    fn parse_scalar(input: &str) -> IResult<&str, Plist> {
        if Self::opens(input, "string") {
            map(Self::parse_string, Plist::String).parse(input)
        } else if Self::opens(input, "integer") {
            map(Self::parse_integer, Plist::Integer).parse(input)
        } else if Self::opens(input, "real") {
            map(Self::parse_float, Plist::Float).parse(input)
        } else if Self::opens(input, "true") {
            value(Plist::Boolean(true), |i| Self::parse_boolean(i, "true")).parse(input)
        } else if Self::opens(input, "false") {
            value(Plist::Boolean(false), |i| Self::parse_boolean(i, "false")).parse(input)
        } else if Self::opens(input, "date") {
            map(Self::parse_date, Plist::Date).parse(input)
        } else if Self::opens(input, "data") {
            map(Self::parse_data, Plist::Data).parse(input)
        } else {
            Err(Self::failure(input, ErrorKind::Tag))
        }
    }

    fn parse_dict(input: &str, depth: usize) -> IResult<&str, IndexMap<String, Plist>> {
        let (mut input, empty) = Self::open_tag(input, "dict")?;
        let mut dict = IndexMap::new();
        if empty {
            return Ok((input, dict));
        }
        loop {
            let (rest, _) = Self::skip(input)?;
            input = rest;
            if !Self::opens(input, "key") {
                break;
            }
            let (rest, key) = Self::parse_text_element(input, "key")?;
            let (rest, item) = Self::parse_value(rest, depth + 1).map_err(Self::fatal)?;
            if dict.insert(key.clone(), item).is_some() {
                warn!(key = %key, "duplicate dictionary key, keeping the last value");
            }
            input = rest;
        }
        let (input, _) = Self::close_tag(input, "dict").map_err(Self::fatal)?;
        Ok((input, dict))
    }

    fn parse_array(input: &str, depth: usize) -> IResult<&str, Vec<Plist>> {
        let (mut input, empty) = Self::open_tag(input, "array")?;
        let mut values = vec![];
        if empty {
            return Ok((input, values));
        }
        loop {
            match Self::parse_value(input, depth + 1) {
                Ok((rest, item)) => {
                    values.push(item);
                    input = rest;
                }
                Err(nom::Err::Error(_)) => break,
                Err(err) => return Err(err),
            }
        }
        let (input, _) = Self::skip(input)?;
        let (input, _) = Self::close_tag(input, "array").map_err(Self::fatal)?;
        Ok((input, values))
    }

    /// Any value; `depth` counts the containers around it.
    fn parse_value(input: &str, depth: usize) -> IResult<&str, Plist> {
        let (input, _) = Self::skip(input)?;
        let is_dict = Self::opens(input, "dict");
        if is_dict || Self::opens(input, "array") {
            if depth >= MAX_DEPTH {
                return Err(Self::failure(input, ErrorKind::TooLarge));
            }
            let result = if is_dict {
                Self::parse_dict(input, depth).map(|(rest, dict)| (rest, Plist::Dictionary(dict)))
            } else {
                Self::parse_array(input, depth).map(|(rest, array)| (rest, Plist::Array(array)))
            };
            result.map_err(Self::fatal)
        } else if input.is_empty() || input.starts_with("</") {
            // end of the enclosing container, let the caller decide
            Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag)))
        } else {
            Self::parse_scalar(input).map_err(Self::fatal)
        }
    }

    fn fatal(err: nom::Err<nom::error::Error<&str>>) -> nom::Err<nom::error::Error<&str>> {
        match err {
            nom::Err::Error(e) => nom::Err::Failure(e),
            other => other,
        }
    }

    fn parse_document(input: &str) -> IResult<&str, Plist> {
        let (input, _) = Self::parse_prolog(input)?;
        let (input, plist) = Self::parse_value(input, 0)?;
        let (input, _) = Self::skip(input)?;
        let (input, _) = Self::close_tag(input, "plist")?;
        let (input, _) = Self::skip(input)?;
        let (input, _) = eof.parse(input)?;
        Ok((input, plist))
    }

    pub fn parse(input: &[u8]) -> Result<Plist> {
        let input = std::str::from_utf8(input)
            .map_err(|e| Error::Parse(format!("invalid UTF-8 at byte {}", e.valid_up_to())))?;
        let (_, plist) = Self::parse_document(input)?;
        debug!(root = plist.kind(), "decoded XML plist");
        Ok(plist)
    }
}

/// RFC 3339, or the truncated `YYYY[-MM[-DD[THH[:MM[:SS]]]]]Z` forms.
fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    let text = text.strip_suffix('Z')?;
    let (date, time) = match text.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };
    let date: Vec<&str> = date.split('-').collect();
    let time: Vec<&str> = time.map(|t| t.split(':').collect()).unwrap_or_default();
    if date.len() > 3 || time.len() > 3 || (!time.is_empty() && date.len() != 3) {
        return None;
    }
    let field = |parts: &[&str], i: usize, width: usize, default: u32| match parts.get(i) {
        None => Some(default),
        Some(part) if part.len() == width && part.bytes().all(|b| b.is_ascii_digit()) => {
            part.parse().ok()
        }
        Some(_) => None,
    };
    Utc.with_ymd_and_hms(
        field(&date[..], 0, 4, 0)? as i32,
        field(&date[..], 1, 2, 1)?,
        field(&date[..], 2, 2, 1)?,
        field(&time[..], 0, 2, 0)?,
        field(&time[..], 1, 2, 0)?,
        field(&time[..], 2, 2, 0)?,
    )
    .single()
}

/// Decimal or `0x` hexadecimal, with an optional sign.
fn parse_int(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.starts_with(['+', '-']) => i128::from_str_radix(hex, 16).ok()?,
        Some(_) => return None,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
