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

mod deserialize;
mod error;
mod serialize;

pub(crate) use deserialize::PackStreamDeserializerImpl;
pub(crate) use error::PackStreamSerializeError;
pub(crate) use serialize::{PackStreamSerialize, PackStreamSerializer, PackStreamSerializerImpl};

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::macros::hash_map;
    use crate::value::Structure;
    use crate::{value, ValueReceive, ValueSend};

    fn encode(value: &ValueSend) -> Vec<u8> {
        let mut buffer = Vec::new();
        value
            .serialize(&mut PackStreamSerializerImpl::new(&mut buffer))
            .unwrap();
        buffer
    }

    fn decode(input: &[u8]) -> (ValueReceive, Vec<u8>) {
        let mut reader = input;
        let value = PackStreamDeserializerImpl::new(&mut reader).load().unwrap();
        (value, reader.to_vec())
    }

    #[rstest]
    #[case(value!(null), vec![0xC0])]
    #[case(value!(false), vec![0xC2])]
    #[case(value!(true), vec![0xC3])]
    #[case(value!((-16)), vec![0xF0])]
    #[case(value!(0), vec![0x00])]
    #[case(value!(127), vec![0x7F])]
    #[case(value!((-17)), vec![0xC8, 0xEF])]
    #[case(value!((-128)), vec![0xC8, 0x80])]
    #[case(value!(128), vec![0xC9, 0x00, 0x80])]
    #[case(value!((-129)), vec![0xC9, 0xFF, 0x7F])]
    #[case(value!(32_768), vec![0xCA, 0x00, 0x00, 0x80, 0x00])]
    #[case(value!(2_147_483_648i64), vec![0xCB, 0, 0, 0, 0, 0x80, 0, 0, 0])]
    #[case(value!(1.23), vec![0xC1, 0x3F, 0xF3, 0xAE, 0x14, 0x7A, 0xE1, 0x47, 0xAE])]
    #[case(value!(""), vec![0x80])]
    #[case(value!("A"), vec![0x81, 0x41])]
    #[case(value!([1, [2]]), vec![0x92, 0x01, 0x91, 0x02])]
    #[case(value!({"a": 1}), vec![0xA1, 0x81, 0x61, 0x01])]
    fn test_encode(#[case] input: ValueSend, #[case] output: Vec<u8>) {
        assert_eq!(encode(&input), output);
    }

    #[rstest]
    fn test_encode_sized_string() {
        let string = "x".repeat(16);
        let mut expected = vec![0xD0, 0x10];
        expected.extend(string.as_bytes());
        assert_eq!(encode(&ValueSend::String(string)), expected);

        let string = "y".repeat(256);
        let mut expected = vec![0xD1, 0x01, 0x00];
        expected.extend(string.as_bytes());
        assert_eq!(encode(&ValueSend::String(string)), expected);
    }

    #[rstest]
    fn test_encode_struct_header() {
        let mut buffer = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut buffer);
        serializer.write_struct_header(0x10, 3).unwrap();
        assert!(serializer.write_struct_header(0x10, 16).is_err());
        assert_eq!(buffer, [0xB3, 0x10]);
    }

    #[rstest]
    #[case(vec![0xC0], ValueReceive::Null)]
    #[case(vec![0xFF], ValueReceive::Integer(-1))]
    #[case(vec![0xC9, 0x80, 0x00], ValueReceive::Integer(-32768))]
    #[case(vec![0xCA, 0x7F, 0xFF, 0xFF, 0xFF], ValueReceive::Integer(2147483647))]
    #[case(vec![0xCC, 0x02, 0x00, 0xFF], ValueReceive::Bytes(vec![0x00, 0xFF]))]
    #[case(vec![0x84, 0xF0, 0x9F, 0xA4, 0x98], ValueReceive::String("🤘".into()))]
    #[case(vec![0xD0, 0x01, 0x41], ValueReceive::String("A".into()))]
    #[case(vec![0xD4, 0x01, 0xC3], ValueReceive::List(vec![ValueReceive::Boolean(true)]))]
    #[case(
        vec![0xA2, 0x81, 0x61, 0x01, 0x81, 0x62, 0x90],
        ValueReceive::Map(hash_map!(
            "a".into() => ValueReceive::Integer(1),
            "b".into() => ValueReceive::List(vec![]),
        ))
    )]
    #[case(
        vec![0xB2, 0x58, 0x01, 0x80],
        ValueReceive::Structure(Structure {
            tag: 0x58,
            fields: vec![ValueReceive::Integer(1), ValueReceive::String("".into())],
        })
    )]
    fn test_decode(#[case] input: Vec<u8>, #[case] output: ValueReceive) {
        let (result, rest) = decode(&input);
        assert_eq!(result, output);
        assert!(rest.is_empty());
    }

    #[rstest]
    fn test_decode_leaves_rest() {
        let (result, rest) = decode(&[0x01, 0x02]);
        assert_eq!(result, ValueReceive::Integer(1));
        assert_eq!(rest, [0x02]);
    }

    #[rstest]
    #[case(vec![0xC7])]
    #[case(vec![0xA1, 0x01, 0x01])]
    #[case(vec![0x81, 0xFF])]
    fn test_decode_protocol_violation(#[case] input: Vec<u8>) {
        let mut reader = input.as_slice();
        let err = PackStreamDeserializerImpl::new(&mut reader)
            .load()
            .unwrap_err();
        let err: crate::Neo4jError = err.into();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[rstest]
    fn test_decode_truncated_is_disconnect() {
        let mut reader: &[u8] = &[0xCB, 0x00];
        let err = PackStreamDeserializerImpl::new(&mut reader)
            .load()
            .unwrap_err();
        let err: crate::Neo4jError = err.into();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }
}
