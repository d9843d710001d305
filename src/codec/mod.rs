//! ASCII wire codec: command/response frames, the STATUS/LIST data blocks,
//! numeric literal parsing, and the client-facing address-list grammar.

pub mod addr;
pub mod numeric;
pub mod response;
pub mod status;
pub mod verb;

pub use addr::parse_address_list;
pub use numeric::Fraction;
pub use response::{decode_response, encode_response, OkPayload, ResponseFrame, ResponseOutcome, ResponseShape};
pub use status::{ImageLine, StatusReport};
pub use verb::{decode_command, encode_command, CommandFrame, Verb};
