//! Textual disassembly of a decoded stream.

use crate::decoder::FunctionMeta;
use crate::stream::{EmissionStream, Operand};
use std::fmt::Write;

/// Disassemble a decoded stream to a string.
///
/// The listing tolerates unresolved symbolic references, rendering them as
/// diagnostics, so a partially resolvable function still dumps usefully.
#[must_use]
pub fn disassemble(meta: &FunctionMeta, stream: &EmissionStream) -> String {
    let mut output = String::new();

    writeln!(output, "function: {}", meta.name).unwrap();
    if let Some(recv) = &meta.receiver {
        writeln!(output, "  receiver: {}", recv).unwrap();
    }
    if !meta.params.is_empty() {
        writeln!(output, "\nparameters:").unwrap();
        for (i, p) in meta.params.iter().enumerate() {
            writeln!(output, "  {:4}: {} {}", i, p.ty, p.name).unwrap();
        }
    }
    if !meta.locals.is_empty() {
        writeln!(output, "\nlocals:").unwrap();
        for l in meta.locals.iter() {
            writeln!(output, "  {:4}: {}", l.index, l.ty).unwrap();
        }
    }

    writeln!(output, "\nbody ({} bytes):", stream.byte_len()).unwrap();
    for element in stream {
        let marker = match &element.operand {
            Operand::Unresolved(_) => "  ; unresolved token",
            _ => "",
        };
        writeln!(output, "  {}{}", element, marker).unwrap();
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use cinder_core::meta::{GenericContext, MetaToken, MetadataResolver, ResolveError, Symbol};
    use cinder_core::types::{LocalDesc, ParamDesc, Ty};

    struct NeverResolves;

    impl MetadataResolver for NeverResolves {
        fn resolve(&self, token: MetaToken, _cx: &GenericContext) -> Result<Symbol, ResolveError> {
            Err(ResolveError::Unresolved(token))
        }
    }

    #[test]
    fn test_disassemble_listing() {
        let meta = FunctionMeta::statik(
            "demo",
            vec![ParamDesc::new("x", Ty::I32)],
            vec![LocalDesc::new(0, Ty::Object)],
        );
        let mut bytes = vec![0x20]; // ldarg.0
        bytes.push(0x16); // ldstr, unresolved
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.push(0x01); // ret

        let stream = Decoder::new(&meta, &NeverResolves).decode(&bytes).unwrap();
        let text = disassemble(&meta, &stream);

        assert!(text.contains("function: demo"));
        assert!(text.contains("0x0000: ldarg.0 arg0"));
        assert!(text.contains("ldstr"));
        assert!(text.contains("; unresolved token"));
        assert!(text.contains("0x0006: ret"));
    }
}
