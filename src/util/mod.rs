mod display;
mod hash;
mod type_map;

pub(crate) use self::{display::*, hash::*, type_map::*};
