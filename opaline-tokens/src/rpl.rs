//! The numeric replies the tracking core reacts to.
//!
//! Sources:
//!
//! - <https://tools.ietf.org/html/rfc2812.html#section-5>
//! - <https://modern.ircdocs.horse/#numerics>

pub const ISUPPORT: u16 = 5; // 1*13<TOKEN[=value]> :are supported by this server

pub const INVITELIST: u16 = 346; // <channel> <invite mask> [<setter> <ts>]
pub const ENDOFINVITELIST: u16 = 347; // <channel> :End of invite list
pub const EXCEPTLIST: u16 = 348; // <channel> <exception mask> [<setter> <ts>]
pub const ENDOFEXCEPTLIST: u16 = 349; // <channel> :End of exception list
pub const WHOREPLY: u16 = 352; // <channel> <user> <host> <server> <nick> <flags> :<hops> <real>
pub const NAMREPLY: u16 = 353; // <=/*/@> <channel> :1*(@/ /+nick)
pub const ENDOFWHO: u16 = 315; // <name> :End of WHO list
pub const ENDOFNAMES: u16 = 366; // <channel> :End of names list
pub const BANLIST: u16 = 367; // <channel> <ban mask> [<setter> <ts>]
pub const ENDOFBANLIST: u16 = 368; // <channel> :End of ban list

pub const ERR_CHANOPRIVSNEEDED: u16 = 482; // <channel> :You're not an operator

pub const QUIETLIST: u16 = 728; // <channel> q <quiet mask> [<setter> <ts>]
pub const ENDOFQUIETLIST: u16 = 729; // <channel> q :End of quiet list
