mod engine;
mod layout;

pub use engine::{TransferEngine, TransferOutcome, TransferTarget};
pub use layout::{
    fanart_file_name, file_stem, local_path, split_path, subtitle_file_name, thumb_file_name,
    working_name,
};
