use super::reader::{Flags, Reader};
use super::WartsError;

/// Measurement list the following records belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct List {
    pub list_id: u32,
    pub list_id_human: u32,
    pub name: String,
    pub description: String,
    pub monitor: String,
}

impl List {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let mut list = List {
            list_id: r.u32("list id")?,
            list_id_human: r.u32("list id")?,
            name: r.string("list name")?,
            ..List::default()
        };
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => list.description = r.string("list description")?,
                2 => list.monitor = r.string("list monitor")?,
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(list)
    }
}

/// Cycle start or definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cycle {
    pub cycle_id: u32,
    pub list_id: u32,
    pub cycle_id_human: u32,
    pub start_time: u32,
    pub stop_time: u32,
    pub hostname: String,
}

impl Cycle {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let mut cycle = Cycle {
            cycle_id: r.u32("cycle id")?,
            list_id: r.u32("cycle list id")?,
            cycle_id_human: r.u32("cycle id")?,
            start_time: r.u32("cycle start")?,
            ..Cycle::default()
        };
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => cycle.stop_time = r.u32("cycle stop")?,
                2 => cycle.hostname = r.string("cycle hostname")?,
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(cycle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStop {
    pub cycle_id: u32,
    pub stop_time: u32,
}

impl CycleStop {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let stop = CycleStop { cycle_id: r.u32("cycle id")?, stop_time: r.u32("cycle stop")? };
        // no optional fields are defined
        if !r.is_empty() {
            let flags = Flags::read(r)?;
            if !flags.is_empty() {
                flags.skip_params(r)?;
            }
        }
        Ok(stop)
    }
}
