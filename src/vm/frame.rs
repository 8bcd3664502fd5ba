//! Call frames (§4.5 "Call semantics"). A frame owns its function's local
//! scalar/array slots; array locals are either fresh empty arrays or an
//! alias binding into a caller's array (by index into `arrays: Vec<Array>`
//! held on the VM, so "alias" just means "same index").

use std::collections::HashMap;

use crate::value::Value;

pub type Array = HashMap<String, Value>;

pub struct CallFrame {
    pub scalars: Vec<Value>,
    /// Indices into the VM's `arrays` arena; a freshly created local array
    /// gets its own slot there, an aliased one reuses the caller's index.
    pub array_slots: Vec<usize>,
    pub return_pc: usize,
    pub return_code_idx: usize,
}
