//! Core classes every runtime starts with, emitted through [`ClassWriter`] so
//! the universal base type resolves without any class path.

use crate::{
    class::{Code, ClassWriter, Insn},
    consts::{
        CLASS_CLASS, CONSTRUCTOR_NAME, ClassAccessFlag, FieldAccessFlag, MethodAccessFlag,
        OBJECT_CLASS, STRING_CLASS, opcode,
    },
    error::WriteError,
};

/// Class bytes in definition order; every class follows its superclass.
pub(in crate::runtime) fn famous_classes() -> Result<Vec<Vec<u8>>, WriteError> {
    Ok(vec![object_class()?, string_class()?, class_class()?])
}

fn object_class() -> Result<Vec<u8>, WriteError> {
    let mut writer = ClassWriter::new(OBJECT_CLASS, None);
    writer.source_file("Object.java");
    writer
        .method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "()V")
        .code(Code {
            max_stack: 0,
            max_locals: 1,
            instructions: vec![Insn::Op(opcode::RETURN)],
        });
    writer.method(
        MethodAccessFlag::PUBLIC | MethodAccessFlag::NATIVE,
        "hashCode",
        "()I",
    );
    writer.to_bytes()
}

fn string_class() -> Result<Vec<u8>, WriteError> {
    let mut writer = ClassWriter::new(STRING_CLASS, Some(OBJECT_CLASS));
    writer
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .source_file("String.java");
    writer.field(FieldAccessFlag::PRIVATE | FieldAccessFlag::FINAL, "value", "[B");
    writer
        .method(MethodAccessFlag::PUBLIC, CONSTRUCTOR_NAME, "()V")
        .code(super_constructor_call());
    writer.to_bytes()
}

fn class_class() -> Result<Vec<u8>, WriteError> {
    let mut writer = ClassWriter::new(CLASS_CLASS, Some(OBJECT_CLASS));
    writer
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .source_file("Class.java");
    writer
        .method(MethodAccessFlag::PRIVATE, CONSTRUCTOR_NAME, "()V")
        .code(super_constructor_call());
    writer.to_bytes()
}

fn super_constructor_call() -> Code {
    Code {
        max_stack: 1,
        max_locals: 1,
        instructions: vec![
            Insn::Op(opcode::ALOAD_0),
            Insn::InvokeSpecial {
                owner: OBJECT_CLASS.to_string(),
                name: CONSTRUCTOR_NAME.to_string(),
                descriptor: "()V".to_string(),
            },
            Insn::Op(opcode::RETURN),
        ],
    }
}
