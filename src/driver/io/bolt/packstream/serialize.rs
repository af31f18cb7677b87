// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::io::Write;

use usize_cast::FromUsize;

use super::error::PackStreamSerializeError;
use crate::ValueSend;

pub(crate) trait PackStreamSerialize {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error>;
}

pub(crate) trait PackStreamSerializer {
    type Error: std::error::Error;

    fn write_null(&mut self) -> Result<(), Self::Error>;
    fn write_bool(&mut self, b: bool) -> Result<(), Self::Error>;
    fn write_int(&mut self, i: i64) -> Result<(), Self::Error>;
    fn write_float(&mut self, f: f64) -> Result<(), Self::Error>;
    fn write_bytes(&mut self, b: &[u8]) -> Result<(), Self::Error>;
    fn write_string(&mut self, s: &str) -> Result<(), Self::Error>;
    fn write_list_header(&mut self, size: u64) -> Result<(), Self::Error>;
    fn write_dict_header(&mut self, size: u64) -> Result<(), Self::Error>;
    fn write_struct_header(&mut self, tag: u8, size: u8) -> Result<(), Self::Error>;

    fn write_list<V: PackStreamSerialize>(&mut self, list: &[V]) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        self.write_list_header(u64::from_usize(list.len()))?;
        for value in list {
            value.serialize(self)?;
        }
        Ok(())
    }

    fn write_dict<V: PackStreamSerialize>(
        &mut self,
        dict: &HashMap<String, V>,
    ) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        self.write_dict_header(u64::from_usize(dict.len()))?;
        for (key, value) in dict {
            self.write_string(key)?;
            value.serialize(self)?;
        }
        Ok(())
    }
}

/// Marker bytes of a sized type: the tiny marker (if the type has one) and the markers for
/// 8, 16, and 32 bit sizes.
struct SizeMarkers {
    tiny: Option<u8>,
    sized: [u8; 3],
    name: &'static str,
}

const BYTES_MARKERS: SizeMarkers = SizeMarkers {
    tiny: None,
    sized: [0xCC, 0xCD, 0xCE],
    name: "bytes",
};
const STRING_MARKERS: SizeMarkers = SizeMarkers {
    tiny: Some(0x80),
    sized: [0xD0, 0xD1, 0xD2],
    name: "string",
};
const LIST_MARKERS: SizeMarkers = SizeMarkers {
    tiny: Some(0x90),
    sized: [0xD4, 0xD5, 0xD6],
    name: "list",
};
const DICT_MARKERS: SizeMarkers = SizeMarkers {
    tiny: Some(0xA0),
    sized: [0xD8, 0xD9, 0xDA],
    name: "dictionary",
};

pub(crate) struct PackStreamSerializerImpl<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> PackStreamSerializerImpl<'a, W> {
    pub(crate) fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_size(
        &mut self,
        markers: &SizeMarkers,
        size: u64,
    ) -> Result<(), PackStreamSerializeError> {
        match (markers.tiny, size) {
            (Some(tiny), 0..=15) => self.writer.write_all(&[tiny + size as u8])?,
            (_, 0..=0xFF) => {
                self.writer.write_all(&[markers.sized[0], size as u8])?;
            }
            (_, 0x100..=0xFFFF) => {
                self.writer.write_all(&[markers.sized[1]])?;
                self.writer.write_all(&(size as u16).to_be_bytes())?;
            }
            (_, 0x1_0000..=0x7FFF_FFFF) => {
                self.writer.write_all(&[markers.sized[2]])?;
                self.writer.write_all(&(size as u32).to_be_bytes())?;
            }
            _ => {
                return Err(
                    format!("{} exceeds max size of 2,147,483,647", markers.name).into(),
                )
            }
        }
        Ok(())
    }
}

impl<'a, W: Write> PackStreamSerializer for PackStreamSerializerImpl<'a, W> {
    type Error = PackStreamSerializeError;

    fn write_null(&mut self) -> Result<(), Self::Error> {
        self.writer.write_all(&[0xC0])?;
        Ok(())
    }

    fn write_bool(&mut self, b: bool) -> Result<(), Self::Error> {
        self.writer.write_all(&[if b { 0xC3 } else { 0xC2 }])?;
        Ok(())
    }

    fn write_int(&mut self, i: i64) -> Result<(), Self::Error> {
        match i {
            -16..=127 => self.writer.write_all(&(i as i8).to_be_bytes())?,
            -128..=-17 => self.writer.write_all(&[0xC8, i as i8 as u8])?,
            -32_768..=32_767 => {
                self.writer.write_all(&[0xC9])?;
                self.writer.write_all(&(i as i16).to_be_bytes())?;
            }
            -2_147_483_648..=2_147_483_647 => {
                self.writer.write_all(&[0xCA])?;
                self.writer.write_all(&(i as i32).to_be_bytes())?;
            }
            _ => {
                self.writer.write_all(&[0xCB])?;
                self.writer.write_all(&i.to_be_bytes())?;
            }
        }
        Ok(())
    }

    fn write_float(&mut self, f: f64) -> Result<(), Self::Error> {
        self.writer.write_all(&[0xC1])?;
        self.writer.write_all(&f.to_be_bytes())?;
        Ok(())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<(), Self::Error> {
        self.write_size(&BYTES_MARKERS, u64::from_usize(b.len()))?;
        self.writer.write_all(b)?;
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), Self::Error> {
        self.write_size(&STRING_MARKERS, u64::from_usize(s.len()))?;
        self.writer.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_list_header(&mut self, size: u64) -> Result<(), Self::Error> {
        self.write_size(&LIST_MARKERS, size)
    }

    fn write_dict_header(&mut self, size: u64) -> Result<(), Self::Error> {
        self.write_size(&DICT_MARKERS, size)
    }

    fn write_struct_header(&mut self, tag: u8, size: u8) -> Result<(), Self::Error> {
        if size > 15 {
            return Err("structure exceeds max number of fields (15)".into());
        }
        self.writer.write_all(&[0xB0 + size, tag])?;
        Ok(())
    }
}

impl PackStreamSerialize for ValueSend {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        match self {
            ValueSend::Null => serializer.write_null(),
            ValueSend::Boolean(v) => serializer.write_bool(*v),
            ValueSend::Integer(v) => serializer.write_int(*v),
            ValueSend::Float(v) => serializer.write_float(*v),
            ValueSend::String(v) => serializer.write_string(v),
            ValueSend::List(v) => serializer.write_list(v),
            ValueSend::Map(v) => serializer.write_dict(v),
        }
    }
}

impl PackStreamSerialize for str {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        serializer.write_string(self)
    }
}

impl PackStreamSerialize for String {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        serializer.write_string(self)
    }
}

impl PackStreamSerialize for i64 {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        serializer.write_int(*self)
    }
}

impl<V: PackStreamSerialize> PackStreamSerialize for [V] {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        serializer.write_list(self)
    }
}

impl<V: PackStreamSerialize> PackStreamSerialize for HashMap<String, V> {
    fn serialize<S: PackStreamSerializer>(&self, serializer: &mut S) -> Result<(), S::Error> {
        serializer.write_dict(self)
    }
}
