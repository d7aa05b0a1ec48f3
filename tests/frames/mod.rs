//! Frame codec tests: header layout, frame building, parsing and the
//! buffering decoder.

mod decoder;
mod parsing;
