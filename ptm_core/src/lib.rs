pub mod blocks;
pub mod codec;
pub mod encode;
pub mod error;
pub mod fit;
pub mod format;
pub mod header;
pub mod lights;
pub mod multiplex;
pub mod normal;
pub mod photo;
pub mod quantize;
pub mod reader;
pub mod render;
pub mod writer;

pub use blocks::Blocks;
pub use codec::{PlaneCodec, SideInfo};
pub use encode::{encode, Capture, EncodeOptions};
pub use error::{PtmError, Result};
pub use format::{FormatDescriptor, FormatId, FORMATS, MAGIC};
pub use header::{Header, StreamTable};
pub use lights::{read_light_list, LightEntry, LightSample};
pub use photo::{ColorSpace, Photo, RenderedImage};
pub use reader::{read_ptm, Ptm};
pub use writer::{write_ptm, write_ptm_file, PtmWriter};
