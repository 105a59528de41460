//! End-to-end decoder tests: linking, queries, and disassembly over
//! hand-assembled instruction buffers.

use cinder_bytecode::decoder::{Decoder, FunctionMeta};
use cinder_bytecode::dump::disassemble;
use cinder_bytecode::stream::Operand;
use cinder_core::error::CodeError;
use cinder_core::meta::{GenericContext, MetaToken, MetadataResolver, ResolveError, Symbol};
use cinder_core::types::{FieldRef, LocalDesc, ParamDesc, Ty};
use std::sync::Arc;

/// Resolver backed by a fixed table; token N is entry N.
struct TableResolver(Vec<Option<Symbol>>);

impl MetadataResolver for TableResolver {
    fn resolve(&self, token: MetaToken, _cx: &GenericContext) -> Result<Symbol, ResolveError> {
        match self.0.get(token.raw() as usize) {
            Some(Some(sym)) => Ok(sym.clone()),
            Some(None) => Err(ResolveError::Unresolved(token)),
            None => Err(ResolveError::OutOfRange(token)),
        }
    }
}

fn no_tokens() -> TableResolver {
    TableResolver(Vec::new())
}

fn meta() -> FunctionMeta {
    FunctionMeta::statik(
        "subject",
        vec![ParamDesc::new("x", Ty::I32)],
        vec![LocalDesc::new(0, Ty::Object)],
    )
}

#[test]
fn branch_resolves_to_the_element_at_its_target() {
    // br +5 (target 10), five nops, then the target nop at offset 10.
    let mut bytes = vec![0x02];
    bytes.extend_from_slice(&5i32.to_le_bytes());
    bytes.extend_from_slice(&[0x00; 6]);

    let meta = meta();
    let resolver = no_tokens();
    let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();

    let branch = &stream.elements()[0];
    let target = match &branch.operand {
        Operand::Branch(t) => t,
        other => panic!("expected branch operand, got {:?}", other),
    };
    assert_eq!(target.target, 10);

    let element = &stream.elements()[target.element.unwrap() as usize];
    assert_eq!(element.offset, 10);
    assert_eq!(element.offset, target.target);
    assert!(std::ptr::eq(element, stream.element_at_offset(10).unwrap()));
}

#[test]
fn decoding_twice_yields_identical_streams() {
    let field = Arc::new(FieldRef::instance("count", Ty::Object, Ty::I32));
    let resolver = TableResolver(vec![Some(Symbol::Field(field))]);
    let meta = meta();

    let mut bytes = vec![0x20]; // ldarg.0
    bytes.push(0x40); // ldfld token 0
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(0x06); // brfalse +0
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.push(0x01); // ret

    let decoder = Decoder::new(&meta, &resolver);
    let first = decoder.decode(&bytes).unwrap();
    let second = decoder.decode(&bytes).unwrap();
    assert_eq!(first, second);
}

#[test]
fn stream_accounts_for_every_byte() {
    let mut bytes = vec![0x12, 0x2A]; // ldc.i4.s 42
    bytes.push(0x13); // ldc.i8
    bytes.extend_from_slice(&9i64.to_le_bytes());
    bytes.extend_from_slice(&[0xFF, 0x06, 0x00, 0x00]); // stloc 0
    bytes.push(0x01); // ret

    let meta = meta();
    let resolver = no_tokens();
    let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();

    assert_eq!(stream.byte_len() as usize, bytes.len());
    let mut expected = 0;
    for element in &stream {
        assert_eq!(element.offset, expected);
        expected += element.byte_size();
    }
    assert_eq!(expected as usize, bytes.len());
}

#[test]
fn switch_links_every_arm() {
    // switch [a, b, c] followed by three single-byte arms.
    let mut bytes = vec![0x08];
    bytes.extend_from_slice(&3u32.to_le_bytes());
    for disp in [0i32, 1, 2] {
        bytes.extend_from_slice(&disp.to_le_bytes());
    }
    bytes.extend_from_slice(&[0x00, 0x00, 0x00]);

    let meta = meta();
    let resolver = no_tokens();
    let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();

    let table_end = 1 + 4 + 12;
    match &stream.elements()[0].operand {
        Operand::Switch(ts) => {
            for (i, t) in ts.iter().enumerate() {
                assert_eq!(t.target, table_end + i as u32);
                let target = &stream.elements()[t.element.unwrap() as usize];
                assert_eq!(target.offset, t.target);
            }
        }
        other => panic!("expected switch operand, got {:?}", other),
    }
}

#[test]
fn truncated_switch_table_reports_truncation() {
    let mut bytes = vec![0x08];
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes()); // only 1 of 4 entries

    let meta = meta();
    let resolver = no_tokens();
    let err = Decoder::new(&meta, &resolver).decode(&bytes).unwrap_err();
    assert!(matches!(err, CodeError::TruncatedStream { .. }));
}

#[test]
fn disassembly_round_trips_through_display() {
    let resolver = TableResolver(vec![Some(Symbol::Str("greeting".into()))]);
    let meta = meta();

    let mut bytes = vec![0x16]; // ldstr token 0
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(0x01); // ret

    let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
    let text = disassemble(&meta, &stream);
    assert!(text.contains("ldstr \"greeting\""));
    assert!(text.contains("body (6 bytes):"));
}
