pub mod multipart;
pub mod nullable;
pub mod reporter;
pub mod util;
