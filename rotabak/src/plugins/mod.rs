//! Concrete producers, encryptors, remotes and notifiers, selected by the
//! `type` key of their configuration section.

pub mod blockcopy;
pub mod command;
pub mod fsarchiver;
pub mod gnupg;
pub mod log_notifier;
pub mod lvm;
pub mod mysqldp;
pub mod pgdump;
pub mod remote_dir;
pub mod rsyncget;
pub mod s3_remote;
pub mod tarball;
pub mod webhook;
