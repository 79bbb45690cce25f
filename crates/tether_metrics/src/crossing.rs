//! The kinds of boundary crossing the bridge performs.

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Crossing {
    // Host into engine
    Evaluate,
    GetGlobal,
    SetGlobal,
    GetMember,
    SetMember,
    InvokeMember,
    // Engine back into host
    GetProperty,
    SetProperty,
    Invoke,
    RemoveSlot,
}

impl Crossing {
    pub const ALL: [Crossing; 10] = [
        Crossing::Evaluate,
        Crossing::GetGlobal,
        Crossing::SetGlobal,
        Crossing::GetMember,
        Crossing::SetMember,
        Crossing::InvokeMember,
        Crossing::GetProperty,
        Crossing::SetProperty,
        Crossing::Invoke,
        Crossing::RemoveSlot,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True for crossings the engine initiates.
    pub const fn is_callback(self) -> bool {
        matches!(
            self,
            Crossing::GetProperty | Crossing::SetProperty | Crossing::Invoke | Crossing::RemoveSlot
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Crossing::Evaluate => "evaluate",
            Crossing::GetGlobal => "get_global",
            Crossing::SetGlobal => "set_global",
            Crossing::GetMember => "get_member",
            Crossing::SetMember => "set_member",
            Crossing::InvokeMember => "invoke_member",
            Crossing::GetProperty => "get_property",
            Crossing::SetProperty => "set_property",
            Crossing::Invoke => "invoke",
            Crossing::RemoveSlot => "remove_slot",
        }
    }
}

impl fmt::Display for Crossing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
