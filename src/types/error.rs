//! Value and type errors.

use super::{ArithmeticOp, TypeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeError {
    /// A value of one type was used where another was required.
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch { expected: TypeId, actual: TypeId },

    /// Arithmetic on a non-numeric arm.
    #[error("{op:?} not supported on {type_id:?}")]
    UnsupportedArithmetic { op: ArithmeticOp, type_id: TypeId },

    #[error("unknown type id {0}")]
    UnknownTypeId(u8),

    /// Decoding ran out of bytes.
    #[error("truncated {type_id:?} value: need {needed} bytes, have {available}")]
    Truncated {
        type_id: TypeId,
        needed: usize,
        available: usize,
    },

    #[error("invalid utf-8 in varchar payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

pub type TypeResult<T> = Result<T, TypeError>;
