use std::sync::Arc;

use crate::{
    consts::OBJECT_CLASS,
    error::RuntimeError,
    runtime::{NativeEnv, NativeResult, NativeTable, NativeVariable},
};

// public native int hashCode();
fn native_object_hash_code(env: NativeEnv) -> NativeResult<Option<NativeVariable>> {
    let this = env.this.ok_or(RuntimeError::NullReference)?;
    Ok(Some(NativeVariable::Int(this as i32)))
}

pub(in crate::runtime) fn register_natives(table: &NativeTable) {
    table.register(
        OBJECT_CLASS,
        "hashCode",
        "()I",
        Arc::new(native_object_hash_code),
    );
}
