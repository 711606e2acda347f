//! Plist writers used to build test inputs. The crate itself only reads plists.
#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::SecondsFormat;
use plist2json::Plist;

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).expect("fixture must exist")
}

pub trait XmlWriter {
    fn convert_xml(&self, indent: usize) -> String;

    fn to_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
"#,
        );
        xml.push_str(&self.convert_xml(0));
        xml.push_str("</plist>\n");
        xml
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl XmlWriter for Plist {
    fn convert_xml(&self, indent: usize) -> String {
        let indent_str = "\t".repeat(indent);
        let mut xml = String::new();
        match self {
            Plist::Float(value) => xml.push_str(&format!("{}<real>{:?}</real>\n", indent_str, value)),
            Plist::Array(list) => {
                xml.push_str(&format!("{}<array>\n", indent_str));
                for item in list {
                    xml.push_str(&item.convert_xml(indent + 1));
                }
                xml.push_str(&format!("{}</array>\n", indent_str));
            }
            Plist::Dictionary(dict) => {
                xml.push_str(&format!("{}<dict>\n", indent_str));
                for (key, value) in dict {
                    xml.push_str(&format!("\t{}<key>{}</key>\n", indent_str, escape(key)));
                    xml.push_str(&value.convert_xml(indent + 1));
                }
                xml.push_str(&format!("{}</dict>\n", indent_str));
            }
            Plist::Boolean(true) => xml.push_str(&format!("{}<true/>\n", indent_str)),
            Plist::Boolean(false) => xml.push_str(&format!("{}<false/>\n", indent_str)),
            Plist::Integer(value) => {
                xml.push_str(&format!("{}<integer>{}</integer>\n", indent_str, value))
            }
            Plist::String(value) => {
                xml.push_str(&format!("{}<string>{}</string>\n", indent_str, escape(value)))
            }
            Plist::Date(value) => xml.push_str(&format!(
                "{}<date>{}</date>\n",
                indent_str,
                value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            )),
            Plist::Data(value) => xml.push_str(&format!(
                "{}<data>{}</data>\n",
                indent_str,
                STANDARD.encode(value)
            )),
            Plist::Uid(_) => panic!("UIDs only exist in binary plists"),
        }
        xml
    }
}

/// Writes `bplist00` without object sharing.
pub struct BinaryWriter {
    objects: Vec<Vec<u8>>,
    ref_size: u8,
}

fn size_for(max: u64) -> u8 {
    if max <= 0xFF {
        1
    } else if max <= 0xFFFF {
        2
    } else if max <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

fn sized(value: u64, size: u8) -> Vec<u8> {
    value.to_be_bytes()[8 - size as usize..].to_vec()
}

fn count_objects(value: &Plist) -> u64 {
    match value {
        Plist::Array(list) => 1 + list.iter().map(count_objects).sum::<u64>(),
        Plist::Dictionary(dict) => 1 + dict.values().map(|v| 1 + count_objects(v)).sum::<u64>(),
        _ => 1,
    }
}

impl BinaryWriter {
    pub fn write(value: &Plist) -> Vec<u8> {
        let mut writer = BinaryWriter {
            objects: vec![],
            ref_size: size_for(count_objects(value)),
        };
        let top = writer.collect_objects(value);
        let mut output = b"bplist00".to_vec();
        let mut offsets = vec![];
        for object in &writer.objects {
            offsets.push(output.len() as u64);
            output.extend_from_slice(object);
        }
        let offset_table_start = output.len() as u64;
        let offset_size = size_for(offset_table_start);
        for offset in &offsets {
            output.extend(sized(*offset, offset_size));
        }
        let mut trailer = [0u8; 32];
        trailer[6] = offset_size;
        trailer[7] = writer.ref_size;
        trailer[8..16].copy_from_slice(&(offsets.len() as u64).to_be_bytes());
        trailer[16..24].copy_from_slice(&top.to_be_bytes());
        trailer[24..32].copy_from_slice(&offset_table_start.to_be_bytes());
        output.extend_from_slice(&trailer);
        output
    }

    fn collect_objects(&mut self, value: &Plist) -> u64 {
        let index = self.objects.len() as u64;
        self.objects.push(vec![]);
        let bytes = match value {
            Plist::Array(list) => {
                let mut buffer = serialize_length(0xA, list.len());
                for item in list {
                    let object_ref = self.collect_objects(item);
                    buffer.extend(sized(object_ref, self.ref_size));
                }
                buffer
            }
            Plist::Dictionary(dict) => {
                let mut buffer = serialize_length(0xD, dict.len());
                let keys: Vec<u64> = dict
                    .keys()
                    .map(|key| self.collect_objects(&Plist::String(key.clone())))
                    .collect();
                let values: Vec<u64> = dict.values().map(|v| self.collect_objects(v)).collect();
                for object_ref in keys.into_iter().chain(values) {
                    buffer.extend(sized(object_ref, self.ref_size));
                }
                buffer
            }
            Plist::Boolean(value) => vec![if *value { 0x09 } else { 0x08 }],
            Plist::Integer(value) => serialize_integer(*value),
            Plist::Float(value) => {
                let mut buffer = vec![0x23];
                buffer.extend(value.to_be_bytes());
                buffer
            }
            Plist::String(value) if value.is_ascii() => {
                let mut buffer = serialize_length(0x5, value.len());
                buffer.extend(value.as_bytes());
                buffer
            }
            Plist::String(value) => {
                let units: Vec<u16> = value.encode_utf16().collect();
                let mut buffer = serialize_length(0x6, units.len());
                for unit in units {
                    buffer.extend(unit.to_be_bytes());
                }
                buffer
            }
            Plist::Date(value) => {
                let unix = value.timestamp() as f64 + value.timestamp_subsec_nanos() as f64 / 1e9;
                let mut buffer = vec![0x33];
                buffer.extend((unix - 978_307_200.0).to_be_bytes());
                buffer
            }
            Plist::Data(value) => {
                let mut buffer = serialize_length(0x4, value.len());
                buffer.extend(value);
                buffer
            }
            Plist::Uid(value) => {
                let mut buffer = vec![0x87];
                buffer.extend(value.to_be_bytes());
                buffer
            }
        };
        self.objects[index as usize] = bytes;
        index
    }
}

fn serialize_length(code: u8, len: usize) -> Vec<u8> {
    if len < 0xF {
        vec![(code << 4) | len as u8]
    } else {
        let mut buffer = vec![(code << 4) | 0x0F];
        buffer.extend(serialize_integer(len as i128));
        buffer
    }
}

fn serialize_integer(value: i128) -> Vec<u8> {
    let mut buffer = match value {
        0..=0xFF => vec![0x10],
        0x100..=0xFFFF => vec![0x11],
        0x1_0000..=0xFFFF_FFFF => vec![0x12],
        _ if i64::try_from(value).is_ok() => vec![0x13],
        _ => vec![0x14],
    };
    let bytes = value.to_be_bytes();
    let width = 1usize << (buffer[0] & 0x0F);
    buffer.extend_from_slice(&bytes[16 - width..]);
    buffer
}
