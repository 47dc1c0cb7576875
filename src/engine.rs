//! Modulation streaming engine.
//!
//! Models the hardware state machine that shifts 4-bit I/Q slices onto the
//! parallel data pins in lock-step with the externally driven parallel clock
//! (PDCLK). The machine loops forever once activated: it waits for PDCLK
//! low, emits an I nibble, waits for PDCLK high, emits a Q nibble. Words are
//! drawn from a bounded FIFO refilled by software; the one real-time
//! contract of the system is that this FIFO never runs dry while the engine
//! is active. Starvation is detected and reported, not healed, because the
//! correct recovery is application-specific.

use crate::gpio::{InputPin, Level, ParallelOut};

/// Nibbles carried by one streaming word.
pub const NIBBLES_PER_WORD: usize = 8;

/// Depth of the word FIFO.
pub const FIFO_DEPTH: usize = 8;

/// One 32-bit streaming word holding 8 sequential 4-bit nibbles.
///
/// Slots alternate between the in-phase and quadrature outputs: even slots
/// drive I, odd slots drive Q.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IqWord(u32);

/// Idle pattern: half-scale I (MSB set), zero Q.
pub const IDLE: IqWord = IqWord(0x8080_8080);

/// Test pattern wiggling the Q output as hard as possible.
pub const ACTIVE: IqWord = IqWord(0x8f8f_8f8f);

/// Placement of the first emitted nibble within a word.
///
/// The layout is inferred from the idle and active bit patterns observed on
/// hardware and is not independently documented, so it is kept configurable;
/// verify empirically against the target before trusting the default.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum NibbleOrder {
    /// First nibble taken from the most significant bits.
    #[default]
    MsbFirst,
    /// First nibble taken from the least significant bits.
    LsbFirst,
}

impl IqWord {
    /// Builds a word from its raw bits.
    pub const fn new(bits: u32) -> IqWord {
        IqWord(bits)
    }

    /// Raw 32-bit value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Nibble at `slot` (0 to 7) under the given order.
    pub fn nibble(self, slot: usize, order: NibbleOrder) -> u8 {
        debug_assert!(slot < NIBBLES_PER_WORD);
        let shift = match order {
            NibbleOrder::MsbFirst => 28 - 4 * slot,
            NibbleOrder::LsbFirst => 4 * slot,
        };
        ((self.0 >> shift) & 0xf) as u8
    }

    /// Builds a word from four (I, Q) nibble pairs in emission order.
    pub fn from_pairs(pairs: [(u8, u8); 4], order: NibbleOrder) -> IqWord {
        let mut bits = 0u32;
        for (pair, (i, q)) in pairs.into_iter().enumerate() {
            let (i, q) = (u32::from(i & 0xf), u32::from(q & 0xf));
            match order {
                NibbleOrder::MsbFirst => {
                    bits |= i << (28 - 8 * pair);
                    bits |= q << (24 - 8 * pair);
                }
                NibbleOrder::LsbFirst => {
                    bits |= i << (8 * pair);
                    bits |= q << (8 * pair + 4);
                }
            }
        }
        IqWord(bits)
    }
}

/// Bounded FIFO of streaming words.
///
/// Single producer (software), single consumer (the engine). The producer
/// only moves the write pointer and the consumer only moves the read
/// pointer, so no further synchronization discipline is required.
#[derive(Debug)]
pub struct WordFifo {
    words: [IqWord; FIFO_DEPTH],
    read: usize,
    len: usize,
}

impl WordFifo {
    /// Creates an empty FIFO.
    pub fn new() -> WordFifo {
        WordFifo {
            words: [IDLE; FIFO_DEPTH],
            read: 0,
            len: 0,
        }
    }

    /// Appends a word. Returns `false` if the FIFO is full.
    pub fn push(&mut self, word: IqWord) -> bool {
        if self.len == FIFO_DEPTH {
            return false;
        }
        self.words[(self.read + self.len) % FIFO_DEPTH] = word;
        self.len += 1;
        true
    }

    /// Removes and returns the oldest word.
    pub fn pop(&mut self) -> Option<IqWord> {
        if self.len == 0 {
            return None;
        }
        let word = self.words[self.read];
        self.read = (self.read + 1) % FIFO_DEPTH;
        self.len -= 1;
        Some(word)
    }

    /// Number of queued words.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the FIFO holds no words.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of free slots.
    pub fn free(&self) -> usize {
        FIFO_DEPTH - self.len
    }
}

impl Default for WordFifo {
    fn default() -> WordFifo {
        WordFifo::new()
    }
}

/// Engine state machine position.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum State {
    /// Waiting for PDCLK to read low.
    WaitILow,
    /// Emitting the next I nibble.
    ShiftI,
    /// Waiting for PDCLK to read high.
    WaitQHigh,
    /// Emitting the next Q nibble.
    ShiftQ,
}

/// Hardware-clocked I/Q nibble emitter.
///
/// The constructor takes ownership of the hardware resources: the PDCLK
/// input (watched, never driven) and the 4-bit parallel output. Software
/// interacts with a running engine only by pushing words into the FIFO and
/// reading the underrun accounting; there is no assumption about when the
/// consumer drains an entry beyond FIFO order.
#[derive(Debug)]
pub struct Engine<Pdclk, Out> {
    pdclk: Pdclk,
    out: Out,
    fifo: WordFifo,
    order: NibbleOrder,
    state: State,
    current: Option<(IqWord, usize)>,
    active: bool,
    starved: bool,
    underruns: u64,
    clock_hz: f64,
}

impl<Pdclk: InputPin, Out: ParallelOut> Engine<Pdclk, Out> {
    /// Creates a deactivated engine with an empty FIFO.
    ///
    /// `clock_hz` is the nibble shift rate the external clock is expected to
    /// run at; the engine itself never drives PDCLK.
    pub fn new(pdclk: Pdclk, out: Out, clock_hz: f64) -> Engine<Pdclk, Out> {
        Engine {
            pdclk,
            out,
            fifo: WordFifo::new(),
            order: NibbleOrder::default(),
            state: State::WaitILow,
            current: None,
            active: false,
            starved: false,
            underruns: 0,
            clock_hz,
        }
    }

    /// Overrides the nibble-to-pin mapping.
    pub fn set_nibble_order(&mut self, order: NibbleOrder) {
        self.order = order;
    }

    /// Appends a word to the FIFO. Returns `false` if the FIFO is full.
    ///
    /// A successful push ends a starvation episode.
    pub fn push(&mut self, word: IqWord) -> bool {
        let pushed = self.fifo.push(word);
        if pushed {
            self.starved = false;
        }
        pushed
    }

    /// Fills all free FIFO slots with the idle pattern.
    pub fn preload_idle(&mut self) {
        while self.push(IDLE) {}
    }

    /// Number of queued words.
    pub fn fifo_level(&self) -> usize {
        self.fifo.len()
    }

    /// Number of free FIFO slots the producer may fill.
    pub fn fifo_free(&self) -> usize {
        self.fifo.free()
    }

    /// Activates the engine.
    ///
    /// The FIFO should be pre-loaded first (see [`Engine::preload_idle`]);
    /// activating with an empty FIFO underruns on the first shift.
    pub fn activate(&mut self) {
        tracing::debug!(fifo_level = self.fifo.len(), "activating engine");
        self.active = true;
    }

    /// Deactivates the engine.
    ///
    /// Emission halts at the current state machine position; there is no
    /// partial-word rollback.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Whether the engine is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of distinct starvation episodes since construction.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Whether the engine is currently starved of data.
    pub fn is_starved(&self) -> bool {
        self.starved
    }

    /// Expected external shift clock rate in Hz.
    pub fn clock_hz(&self) -> f64 {
        self.clock_hz
    }

    /// Current state machine position.
    pub fn state(&self) -> State {
        self.state
    }

    /// Executes one state machine step and returns the resulting position.
    ///
    /// Wait states sample PDCLK and advance when it reads the level they
    /// gate on; shift states emit the next nibble, refilling from the FIFO
    /// when the current word is exhausted. A shift with no data available
    /// stalls in place and counts one underrun per starvation episode. An
    /// inactive engine does nothing.
    pub fn poll(&mut self) -> State {
        if !self.active {
            return self.state;
        }
        match self.state {
            State::WaitILow => {
                if self.pdclk.read() == Level::Low {
                    self.state = State::ShiftI;
                }
            }
            State::ShiftI => {
                if self.shift() {
                    self.state = State::WaitQHigh;
                }
            }
            State::WaitQHigh => {
                if self.pdclk.read() == Level::High {
                    self.state = State::ShiftQ;
                }
            }
            State::ShiftQ => {
                if self.shift() {
                    self.state = State::WaitILow;
                }
            }
        }
        self.state
    }

    /// Restarts the engine as a simple carrier generator.
    ///
    /// The external clock is expected to run at twice the requested tone
    /// frequency (one I plus one Q nibble per output period). Queued words
    /// are dropped, the FIFO is re-seeded with the idle pattern, and the
    /// engine is activated from the top of the cycle.
    pub fn baseband_tone(&mut self, freq: f64) {
        self.deactivate();
        self.clock_hz = 2.0 * freq;
        self.fifo = WordFifo::new();
        self.current = None;
        self.state = State::WaitILow;
        self.starved = false;
        self.preload_idle();
        self.activate();
    }

    fn shift(&mut self) -> bool {
        let (word, slot) = match self.current.take() {
            Some(current) => current,
            None => match self.fifo.pop() {
                Some(word) => (word, 0),
                None => {
                    if !self.starved {
                        self.starved = true;
                        self.underruns += 1;
                        tracing::warn!("streaming FIFO underrun");
                    }
                    return false;
                }
            },
        };
        self.out.write_nibble(word.nibble(slot, self.order));
        if slot + 1 < NIBBLES_PER_WORD {
            self.current = Some((word, slot + 1));
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct TestClk(Rc<Cell<Level>>);

    impl InputPin for TestClk {
        fn read(&self) -> Level {
            self.0.get()
        }
    }

    struct Record(Rc<RefCell<Vec<u8>>>);

    impl ParallelOut for Record {
        fn write_nibble(&mut self, nibble: u8) {
            self.0.borrow_mut().push(nibble);
        }
    }

    struct Harness {
        engine: Engine<TestClk, Record>,
        clk: Rc<Cell<Level>>,
        pins: Rc<RefCell<Vec<u8>>>,
    }

    fn harness() -> Harness {
        let clk = Rc::new(Cell::new(Level::High));
        let pins = Rc::new(RefCell::new(Vec::new()));
        let engine = Engine::new(
            TestClk(Rc::clone(&clk)),
            Record(Rc::clone(&pins)),
            2.0 * 156.25e3,
        );
        Harness { engine, clk, pins }
    }

    impl Harness {
        // one full PDCLK period: low half (I shift), high half (Q shift)
        fn drive_period(&mut self) {
            self.clk.set(Level::Low);
            self.engine.poll();
            self.engine.poll();
            self.clk.set(Level::High);
            self.engine.poll();
            self.engine.poll();
        }
    }

    #[test]
    fn idle_word_nibbles() {
        for slot in 0..NIBBLES_PER_WORD {
            let expected = if slot % 2 == 0 { 0x8 } else { 0x0 };
            assert_eq!(IDLE.nibble(slot, NibbleOrder::MsbFirst), expected);
        }
        // the mapping flips under the alternate order
        assert_eq!(IDLE.nibble(0, NibbleOrder::LsbFirst), 0x0);
        assert_eq!(IDLE.nibble(1, NibbleOrder::LsbFirst), 0x8);
    }

    #[test]
    fn word_from_pairs() {
        assert_eq!(
            IqWord::from_pairs([(0x8, 0xf); 4], NibbleOrder::MsbFirst),
            ACTIVE
        );
        assert_eq!(
            IqWord::from_pairs([(0x8, 0x0); 4], NibbleOrder::LsbFirst),
            IqWord::new(0x0808_0808)
        );
    }

    #[test]
    fn fifo_discipline() {
        let mut fifo = WordFifo::new();
        assert!(fifo.is_empty());
        for n in 0..FIFO_DEPTH {
            assert!(fifo.push(IqWord::new(n as u32)));
        }
        assert!(!fifo.push(IDLE));
        assert_eq!(fifo.len(), FIFO_DEPTH);
        assert_eq!(fifo.free(), 0);
        for n in 0..FIFO_DEPTH {
            assert_eq!(fifo.pop(), Some(IqWord::new(n as u32)));
        }
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn state_cycle() {
        let mut h = harness();
        h.engine.push(IDLE);
        h.engine.activate();
        assert_eq!(h.engine.state(), State::WaitILow);
        // clock still high: no transition
        assert_eq!(h.engine.poll(), State::WaitILow);
        h.clk.set(Level::Low);
        assert_eq!(h.engine.poll(), State::ShiftI);
        assert_eq!(h.engine.poll(), State::WaitQHigh);
        // clock still low: no transition
        assert_eq!(h.engine.poll(), State::WaitQHigh);
        h.clk.set(Level::High);
        assert_eq!(h.engine.poll(), State::ShiftQ);
        assert_eq!(h.engine.poll(), State::WaitILow);
        assert_eq!(*h.pins.borrow(), vec![0x8, 0x0]);
    }

    #[test]
    fn preloaded_fifo_never_underruns() {
        let mut h = harness();
        h.engine.preload_idle();
        assert_eq!(h.engine.fifo_level(), FIFO_DEPTH);
        h.engine.activate();
        // drain all 8 words: 4 periods per word
        for _ in 0..FIFO_DEPTH * NIBBLES_PER_WORD / 2 {
            h.drive_period();
        }
        assert_eq!(h.engine.underruns(), 0);
        assert!(!h.engine.is_starved());
        assert_eq!(h.pins.borrow().len(), FIFO_DEPTH * NIBBLES_PER_WORD);
        assert!(h
            .pins
            .borrow()
            .chunks(2)
            .all(|pair| pair == [0x8, 0x0]));
    }

    #[test]
    fn starvation_reported_once_per_episode() {
        let mut h = harness();
        h.engine.preload_idle();
        h.engine.activate();
        for _ in 0..FIFO_DEPTH * NIBBLES_PER_WORD / 2 {
            h.drive_period();
        }
        // one word beyond the enqueued count: a single underrun, not one
        // per attempted shift
        for _ in 0..NIBBLES_PER_WORD / 2 {
            h.drive_period();
        }
        assert_eq!(h.engine.underruns(), 1);
        assert!(h.engine.is_starved());

        // refilling ends the episode and emission resumes
        let emitted = h.pins.borrow().len();
        assert!(h.engine.push(ACTIVE));
        assert!(!h.engine.is_starved());
        for _ in 0..NIBBLES_PER_WORD / 2 {
            h.drive_period();
        }
        assert_eq!(h.engine.underruns(), 1);
        assert_eq!(
            h.pins.borrow()[emitted..],
            [0x8, 0xf, 0x8, 0xf, 0x8, 0xf, 0x8, 0xf]
        );

        // a second starvation is a second episode
        h.drive_period();
        assert_eq!(h.engine.underruns(), 2);
    }

    #[test]
    fn inactive_engine_does_nothing() {
        let mut h = harness();
        h.engine.preload_idle();
        h.clk.set(Level::Low);
        assert_eq!(h.engine.poll(), State::WaitILow);
        assert!(h.pins.borrow().is_empty());
    }

    #[test]
    fn deactivate_halts_mid_word() {
        let mut h = harness();
        h.engine.preload_idle();
        h.engine.activate();
        h.drive_period();
        h.engine.deactivate();
        let emitted = h.pins.borrow().len();
        h.drive_period();
        assert_eq!(h.pins.borrow().len(), emitted);
    }

    #[test]
    fn tone_restart() {
        let mut h = harness();
        h.engine.push(ACTIVE);
        h.engine.activate();
        h.drive_period();
        h.engine.baseband_tone(100e3);
        assert_eq!(h.engine.clock_hz(), 200e3);
        assert_eq!(h.engine.state(), State::WaitILow);
        assert_eq!(h.engine.fifo_level(), FIFO_DEPTH);
        assert!(h.engine.is_active());
        // the re-seeded FIFO plays the idle pattern
        let emitted = h.pins.borrow().len();
        h.drive_period();
        assert_eq!(h.pins.borrow()[emitted..], [0x8, 0x0]);
    }
}
