use shared::error::Result;
use stun::attributes::{
    Uint32Attr, Uint64Attr, ATTR_ICE_CONTROLLED, ATTR_ICE_CONTROLLING, ATTR_PRIORITY,
    ATTR_USE_CANDIDATE,
};
use stun::message::{Getter, Message, Setter};

/// ICE-CONTROLLING attribute carrying the agent tie-breaker
/// (RFC 8445 Section 16.1).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttrControlling(pub u64);

impl Setter for AttrControlling {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        Uint64Attr::new(ATTR_ICE_CONTROLLING, self.0).add_to(m)
    }
}

impl Getter for AttrControlling {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let mut attr = Uint64Attr::new(ATTR_ICE_CONTROLLING, 0);
        attr.get_from(m)?;
        self.0 = attr.value;
        Ok(())
    }
}

/// ICE-CONTROLLED attribute carrying the agent tie-breaker.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttrControlled(pub u64);

impl Setter for AttrControlled {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        Uint64Attr::new(ATTR_ICE_CONTROLLED, self.0).add_to(m)
    }
}

impl Getter for AttrControlled {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let mut attr = Uint64Attr::new(ATTR_ICE_CONTROLLED, 0);
        attr.get_from(m)?;
        self.0 = attr.value;
        Ok(())
    }
}

/// PRIORITY attribute from RFC 8445 Section 16.1.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PriorityAttr(pub u32);

impl Setter for PriorityAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        Uint32Attr::new(ATTR_PRIORITY, self.0).add_to(m)
    }
}

impl Getter for PriorityAttr {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let mut attr = Uint32Attr::new(ATTR_PRIORITY, 0);
        attr.get_from(m)?;
        self.0 = attr.value;
        Ok(())
    }
}

/// USE-CANDIDATE flag attribute used for nomination.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct UseCandidateAttr;

impl UseCandidateAttr {
    pub fn is_set(m: &Message) -> bool {
        m.contains(ATTR_USE_CANDIDATE)
    }
}

impl Setter for UseCandidateAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_USE_CANDIDATE, &[]);
        Ok(())
    }
}
