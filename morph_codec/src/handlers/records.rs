use crate::compiler::CompileCx;
use crate::errors::{CodecError, CodecResult};
use crate::registry::{DecodeFn, EncodeFn, TypeHandler};
use morph_types::TypeDescriptor;

/// Nested records of any kind. The routine is compiled in the current
/// session, or referenced through a handle while it is still compiling.
pub struct RecordHandler;

fn record_name(ty: &TypeDescriptor) -> CodecResult<&str> {
    ty.shape
        .record_name()
        .ok_or_else(|| CodecError::unsupported(ty.to_string()))
}

impl TypeHandler for RecordHandler {
    fn decoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<DecodeFn> {
        cx.record_decoder(record_name(ty)?)
    }

    fn encoder(&self, ty: &TypeDescriptor, cx: &mut CompileCx<'_>) -> CodecResult<EncodeFn> {
        cx.record_encoder(record_name(ty)?)
    }
}
