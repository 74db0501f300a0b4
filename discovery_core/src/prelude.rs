pub use bevy::prelude::{
    default, App, Commands, Component, Deref, DerefMut, Entity, Event, EventReader, EventWriter,
    Events, IntoSystemConfigs, IntoSystemSetConfigs, Plugin, Query, Res, ResMut, Resource,
    Startup, SystemSet, Time, Update, With, Without, World,
};

pub use crate::op::{Op, OpResult, OpSubtype};
