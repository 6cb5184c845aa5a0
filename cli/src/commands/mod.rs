mod helpers;
mod ledger;

pub(crate) use ledger::{cmd_add, cmd_show, cmd_sub};
