//! Operator forwarding macros
//!
//! Elements carry their modulus at runtime, so each operator is written once
//! over borrowed operands and the owned forms forward to it

/// Implement a unary operator on an owned value given its implementation on
/// a reference
macro_rules! forward_unop {
    ($target:ty, $trait:ident, $fn_name:ident, $op:tt) => {
        impl $trait for $target {
            type Output = $target;

            fn $fn_name(self) -> $target {
                $op &self
            }
        }
    };
}

/// Implement the owned and mixed forms of a binary operator given its
/// implementation on `&lhs op &rhs`
///
/// With `commutative` the forms with the operands swapped are implemented as
/// well, all of them forwarding to the same borrowed implementation
macro_rules! forward_binop {
    ($lhs:ty, $trait:ident, $fn_name:ident, $op:tt, $rhs:ty) => {
        impl $trait<$rhs> for &$lhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: $rhs) -> $lhs {
                self $op &rhs
            }
        }

        impl $trait<&$rhs> for $lhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: &$rhs) -> $lhs {
                &self $op rhs
            }
        }

        impl $trait<$rhs> for $lhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: $rhs) -> $lhs {
                &self $op &rhs
            }
        }
    };

    ($lhs:ty, $trait:ident, $fn_name:ident, $op:tt, $rhs:ty, commutative) => {
        forward_binop!($lhs, $trait, $fn_name, $op, $rhs);

        impl $trait<&$lhs> for &$rhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: &$lhs) -> $lhs {
                rhs $op self
            }
        }

        impl $trait<$lhs> for &$rhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: $lhs) -> $lhs {
                &rhs $op self
            }
        }

        impl $trait<&$lhs> for $rhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: &$lhs) -> $lhs {
                rhs $op &self
            }
        }

        impl $trait<$lhs> for $rhs {
            type Output = $lhs;

            fn $fn_name(self, rhs: $lhs) -> $lhs {
                &rhs $op &self
            }
        }
    };
}

pub(crate) use forward_binop;
pub(crate) use forward_unop;
