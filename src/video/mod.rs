/*!
 * Frame Codec
 *
 * Raw frame representation plus JPEG compression and fingerprinting.
 */

pub mod encoder;
pub mod frame;

pub use encoder::{encode_jpeg, fingerprint, EncodedFrame, EncoderConfig, FINGERPRINT_LEN};
pub use frame::{PixelFormat, RawFrame};
