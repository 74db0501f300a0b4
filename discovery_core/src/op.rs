use crate::prelude::*;

/// A request to do something to a camera view.
#[derive(Clone, Debug, Event)]
pub struct Op<O> {
    pub op: O,
    pub view: Entity,
}

/// Something a camera view can be asked to do, such as starting detection or
/// capturing what was found. Every request is answered with an [OpResult].
pub trait OpSubtype: Clone {
    /// Why a view refused the request
    type Error;

    /// Addresses this request to the camera view entity `view`.
    fn for_view(self, view: Entity) -> Op<Self> {
        Op::new(view, self)
    }
}

/// Reply to an [Op], sent in the same frame the view handled it, so the
/// presentation layer can report refusals like a camera that is still warming up.
#[derive(Clone, Debug, Event, getset::Getters)]
pub struct OpResult<O: OpSubtype> {
    #[getset(get = "pub")]
    source: Op<O>,
    #[getset(get = "pub")]
    result: Result<(), O::Error>,
}

impl<O: OpSubtype> OpResult<O> {
    pub fn new(source: &Op<O>, result: Result<(), O::Error>) -> Self {
        OpResult {
            source: source.clone(),
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl<O> Op<O> {
    pub fn new(view: Entity, op: O) -> Self {
        Op { op, view }
    }

    pub fn op(&self) -> &O {
        &self.op
    }

    pub fn view(&self) -> Entity {
        self.view
    }
}
