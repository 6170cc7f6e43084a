//! JSON variable source: the whole document becomes the source value

use std::io::Read;

use serde_json::Value as JsonValue;

pub fn read_json<R: Read>(reader: R) -> Result<JsonValue, serde_json::Error> {
    serde_json::from_reader(reader)
}
