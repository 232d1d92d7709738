use futures::future::LocalBoxFuture;

use dfview_memory::MemView;
use dfview_types::{DfType, PrimitiveKind};

use crate::{ItemReader, ReadError, ReadSession, Readable, ReaderError, ReaderFactory};

enum StringKind {
    /// A `std::string` cell, decoded by the ABI.
    Std,
    /// A `const char *` cell; not decoded.
    Ptr,
    /// A fixed char array, NUL-terminated within its extent.
    Fixed(usize),
}

/// Reader for strings.
///
/// Accepts `std::string` cells, static strings (fixed char arrays) and
/// `ptr-string` cells, the latter only for layout.
pub struct StringReader {
    kind: StringKind,
    size: usize,
}

impl ItemReader for StringReader {
    type Output = String;

    fn new(factory: &ReaderFactory<'_>, ty: &DfType) -> Result<Self, ReaderError> {
        let host_type = std::any::type_name::<String>();
        match ty {
            DfType::Primitive(PrimitiveKind::StdString) => Ok(StringReader {
                kind: StringKind::Std,
                size: factory.abi().primitive_info(PrimitiveKind::StdString).size,
            }),
            DfType::Primitive(PrimitiveKind::PtrString) => Ok(StringReader {
                kind: StringKind::Ptr,
                size: factory.abi().primitive_info(PrimitiveKind::PtrString).size,
            }),
            DfType::StaticArray(array) => {
                let item = factory.schema().resolve(&array.item);
                match item {
                    Ok(DfType::Primitive(PrimitiveKind::Char)) => {
                        let extent = array.extent.ok_or_else(|| {
                            ReaderError::type_mismatch("static string without extent", ty, host_type)
                        })?;
                        Ok(StringReader {
                            kind: StringKind::Fixed(extent),
                            size: extent,
                        })
                    }
                    _ => Err(ReaderError::type_mismatch("not a string type", ty, host_type)),
                }
            }
            other => Err(ReaderError::type_mismatch("not a string type", other, host_type)),
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read<'a>(
        &'a self,
        session: &'a ReadSession<'a>,
        view: MemView<'a>,
        out: &'a mut String,
    ) -> LocalBoxFuture<'a, Result<(), ReadError>> {
        Box::pin(async move {
            match &self.kind {
                StringKind::Std => {
                    *out = session.abi().read_string(session.process(), view).await?;
                    Ok(())
                }
                StringKind::Ptr => Err(ReadError::NotImplemented("ptr-string contents")),
                StringKind::Fixed(extent) => {
                    let bytes = &view.data[..*extent];
                    let terminated = match bytes.iter().position(|&b| b == 0) {
                        Some(nul) => &bytes[..nul],
                        None => bytes,
                    };
                    *out = String::from_utf8_lossy(terminated).into_owned();
                    Ok(())
                }
            }
        })
    }
}

impl Readable for String {
    type Reader = StringReader;
}
