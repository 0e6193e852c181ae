use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

pub trait Executable {
    fn exec(self, store: Store, config: Config) -> Result<Frame, Error>;
}
