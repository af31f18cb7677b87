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
use std::io::Read;

use usize_cast::IntoUsize;

use super::error::PackStreamDeserializeError;
use crate::value::{Structure, ValueReceive};

type Result<T> = std::result::Result<T, PackStreamDeserializeError>;

pub(crate) struct PackStreamDeserializerImpl<'a, R: Read> {
    reader: &'a mut R,
}

impl<'a, R: Read> PackStreamDeserializerImpl<'a, R> {
    pub(crate) fn new(reader: &'a mut R) -> Self {
        Self { reader }
    }

    pub(crate) fn load(&mut self) -> Result<ValueReceive> {
        let marker = self.read_u8()?;
        Ok(match marker {
            0xC0 => ValueReceive::Null,
            0xC2 => ValueReceive::Boolean(false),
            0xC3 => ValueReceive::Boolean(true),
            0x00..=0x7F | 0xF0..=0xFF => ValueReceive::Integer((marker as i8).into()),
            0xC8 => ValueReceive::Integer(i8::from_be_bytes(self.read_array()?).into()),
            0xC9 => ValueReceive::Integer(i16::from_be_bytes(self.read_array()?).into()),
            0xCA => ValueReceive::Integer(i32::from_be_bytes(self.read_array()?).into()),
            0xCB => ValueReceive::Integer(i64::from_be_bytes(self.read_array()?)),
            0xC1 => ValueReceive::Float(f64::from_be_bytes(self.read_array()?)),
            0xCC..=0xCE => {
                let size = self.read_size(marker - 0xCC)?;
                ValueReceive::Bytes(self.read_bytes(size)?)
            }
            0x80..=0x8F => ValueReceive::String(self.read_string((marker - 0x80).into())?),
            0xD0..=0xD2 => {
                let size = self.read_size(marker - 0xD0)?;
                ValueReceive::String(self.read_string(size)?)
            }
            0x90..=0x9F => ValueReceive::List(self.read_list((marker - 0x90).into())?),
            0xD4..=0xD6 => {
                let size = self.read_size(marker - 0xD4)?;
                ValueReceive::List(self.read_list(size)?)
            }
            0xA0..=0xAF => ValueReceive::Map(self.read_dict((marker - 0xA0).into())?),
            0xD8..=0xDA => {
                let size = self.read_size(marker - 0xD8)?;
                ValueReceive::Map(self.read_dict(size)?)
            }
            0xB0..=0xBF => {
                let tag = self.read_u8()?;
                let fields = self.read_list((marker - 0xB0).into())?;
                ValueReceive::Structure(Structure { tag, fields })
            }
            _ => return Err(format!("unknown marker {marker:02X}").into()),
        })
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buffer = [0; N];
        self.reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// `width` 0, 1, 2 stands for an 8, 16, 32 bit size.
    fn read_size(&mut self, width: u8) -> Result<usize> {
        let size: u32 = match width {
            0 => self.read_u8()?.into(),
            1 => u16::from_be_bytes(self.read_array()?).into(),
            _ => u32::from_be_bytes(self.read_array()?),
        };
        Ok(size.into_usize())
    }

    fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0; size];
        self.reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_string(&mut self, size: usize) -> Result<String> {
        String::from_utf8(self.read_bytes(size)?)
            .map_err(|e| format!("received invalid UTF-8 string: {e}").into())
    }

    fn read_list(&mut self, size: usize) -> Result<Vec<ValueReceive>> {
        (0..size).map(|_| self.load()).collect()
    }

    fn read_dict(&mut self, size: usize) -> Result<HashMap<String, ValueReceive>> {
        let mut dict = HashMap::with_capacity(size);
        for _ in 0..size {
            let key = match self.load()? {
                ValueReceive::String(key) => key,
                other => return Err(format!("expected dictionary key, found {other:?}").into()),
            };
            let value = self.load()?;
            dict.insert(key, value);
        }
        Ok(dict)
    }
}
