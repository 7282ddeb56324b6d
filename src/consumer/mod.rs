mod offset_manager;

pub use self::offset_manager::{
    CommittedOffset, Generation, OffsetManager, OffsetManagerConfig, OffsetStorage,
};
