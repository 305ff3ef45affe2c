//! Row codecs: the gzip delimited source format and the Parquet partition format.

pub mod columnar;
pub mod delimited;

pub use columnar::{decode_columnar, encode_columnar};
pub use delimited::{FIELD_DELIMITER, decode_delimited};
