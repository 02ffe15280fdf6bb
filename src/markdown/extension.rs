use pulldown_cmark::Event;

use super::{Heading, Image, Link};

pub enum Output<'a> {
    Event(Event<'a>),
    Heading(Heading),
    Link(Link),
    Image(Image),
}

pub trait Extension {
    fn process_event<'a>(
        &mut self,
        events: &mut Vec<Event<'a>>,
        event: &Event<'a>,
    ) -> (Option<Vec<Output<'a>>>, bool);

    fn end_of_doc<'a>(&mut self, _events: &mut Vec<Event<'a>>) -> Option<Vec<Output<'a>>> {
        None
    }
}
