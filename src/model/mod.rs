mod bar;
mod criteria;
mod tick;

pub use bar::{Bar, Period};
pub use criteria::{
    floor_to_day, floor_to_hour, floor_to_period, format_instant, normalize_end_of_second,
    BarCriteria, TickCriteria,
};
pub use tick::{Origin, StreamId, Tick};
