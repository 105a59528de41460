//! The conversion protocol: moving a value between storage locations.
//!
//! [`convert`] emits the minimal operation sequence that reads the source
//! slot and writes its value, coerced to the destination slot's type, into
//! the destination. The decision table below is evaluated top to bottom and
//! the first matching rule wins; several cases overlap (object-to-object
//! satisfies both the same-root and object rules) and the earlier rule must
//! take precedence.
//!
//! 1. Same root type: reconcile by-ref-ness (address-of or dereference).
//! 2. `void` destination: the value is dropped, popping bare stack values.
//! 3. `void` source: error; there is no value to convert.
//! 4. `object` destination (not by-ref): load and box.
//! 5. `object` source: load, then unbox to value types or cast to
//!    reference types; by-ref destinations spill to a fresh local and take
//!    its address.
//! 6. Upcast along the base chain or an interface: load and checked-cast.
//! 7. Otherwise: no conversion exists.

use crate::builder::MethodBuilder;
use crate::slot::Slot;
use cinder_core::error::{CodeError, CodeResult};

/// Emit the operations moving `src`'s value into `dst`, coercing between
/// their declared types.
pub fn convert(b: &mut MethodBuilder, src: &Slot, dst: &Slot) -> CodeResult<()> {
    let s = src.ty().clone();
    let d = dst.ty().clone();
    let s_root = s.root();
    let d_root = d.root();

    // Rule 1: identical roots; only by-ref-ness may differ.
    if s_root == d_root {
        dst.emit_store_prelude(b);
        match (s.is_by_ref(), d.is_by_ref()) {
            (false, true) => src.emit_load_address(b),
            (true, false) => {
                src.emit_load(b);
                b.emit_ldobj(s_root.clone());
            }
            _ => src.emit_load(b),
        }
        dst.emit_store(b);
        return Ok(());
    }

    // Rule 2: void destination. A named location's value is simply never
    // read; a bare stack value must be popped.
    if d.is_void() {
        if matches!(src, Slot::Stack { .. }) {
            b.emit_pop();
        }
        return Ok(());
    }

    // Rule 3: void source.
    if s.is_void() {
        return Err(CodeError::no_conversion(&s, &d));
    }

    // Rule 4: object destination.
    if d_root.is_object() && !d.is_by_ref() {
        dst.emit_store_prelude(b);
        src.emit_load(b);
        if s.is_by_ref() {
            b.emit_ldobj(s_root.clone());
        }
        b.emit_box(s_root.clone());
        dst.emit_store(b);
        return Ok(());
    }

    // Rule 5: object source.
    if s_root.is_object() {
        dst.emit_store_prelude(b);
        src.emit_load(b);
        if s.is_by_ref() {
            b.emit_ldobj(s_root.clone());
        }
        if d_root.is_value_type() {
            b.emit_unbox_any(d_root.clone());
        } else {
            b.emit_castclass(d_root.clone());
        }
        if d.is_by_ref() {
            let spill = b.declare_local(d_root.clone());
            b.emit_stloc(spill);
            b.emit_ldloca(spill);
        }
        dst.emit_store(b);
        return Ok(());
    }

    // Rule 6: upcast to a base class or implemented interface.
    if !s.is_by_ref() && !d.is_by_ref() && s.extends_or_implements(&d) {
        dst.emit_store_prelude(b);
        src.emit_load(b);
        b.emit_castclass(d.clone());
        dst.emit_store(b);
        return Ok(());
    }

    // Rule 7: exhausted.
    Err(CodeError::no_conversion(&s, &d))
}
