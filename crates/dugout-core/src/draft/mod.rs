pub mod autodraft;
pub mod clock;
pub mod lock;
pub mod pick;
pub mod room;
