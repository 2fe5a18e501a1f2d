#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod codec;
pub mod contract;
pub mod error;
mod future;
pub mod target;
pub mod template;

pub use codec::{Decoder, Encoder, ErrorDecoder, RequestInterceptor};
pub use contract::{Contract, DefaultContract, Interface, MethodMetadata, MethodSpec, Param, ReturnKind};
pub use error::{BuildError, ContractViolation, Error};
pub use future::ResponseFuture;
pub use target::Target;
pub use template::{Arguments, RequestTemplate};
