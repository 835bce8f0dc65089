use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalColor {
    Green,
    Yellow,
    Red,
}

// One signal's repeating green/yellow/red cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTiming {
    pub id: String,
    // Seconds of green, yellow and red, in that order
    pub durations: [f64; 3],
    // Seconds added to the clock before locating it in the cycle
    pub offset: f64,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

impl SignalTiming {
    pub fn new(id: impl Into<String>, durations: [f64; 3], offset: f64) -> Self {
        Self {
            id: id.into(),
            durations,
            offset,
            confidence: 1.0,
        }
    }

    pub fn cycle(&self) -> f64 {
        self.durations.iter().sum()
    }

    pub fn color(&self, t: f64) -> SignalColor {
        let cycle = self.cycle();
        if cycle == 0.0 {
            return SignalColor::Green;
        }
        let phase = (t + self.offset).rem_euclid(cycle);
        let [green, yellow, _] = self.durations;
        if phase < green {
            SignalColor::Green
        } else if phase < green + yellow {
            SignalColor::Yellow
        } else {
            SignalColor::Red
        }
    }

    // A signal that always shows the same color as this one
    pub fn synchronized(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            durations: self.durations,
            offset: self.offset,
            confidence: self.confidence,
        }
    }

    // A conflicting signal: green (and its yellow) only while this one is red
    pub fn exclusive(&self, id: impl Into<String>) -> Self {
        let [green, yellow, red] = self.durations;
        Self {
            id: id.into(),
            durations: [red - yellow, yellow, green + yellow],
            offset: self.offset + red,
            confidence: self.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub id: String,
    pub color: SignalColor,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficControlState {
    pub sequence: u64,
    pub timestamp: f64,
    pub signals: Vec<SignalState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficPlan {
    pub signals: Vec<SignalTiming>,
    #[serde(default)]
    pub force_green: bool,
    #[serde(skip)]
    sequence: u64,
}

impl TrafficPlan {
    pub fn new(signals: Vec<SignalTiming>) -> Self {
        Self {
            signals,
            force_green: false,
            sequence: 0,
        }
    }

    pub fn with_force_green(mut self, force: bool) -> Self {
        self.force_green = force;
        self
    }

    pub fn state_at(&mut self, t: f64) -> TrafficControlState {
        let signals = self
            .signals
            .iter()
            .map(|s| SignalState {
                id: s.id.clone(),
                color: if self.force_green { SignalColor::Green } else { s.color(t) },
                confidence: s.confidence,
            })
            .collect();
        let state = TrafficControlState {
            sequence: self.sequence,
            timestamp: t,
            signals,
        };
        self.sequence += 1;
        state
    }

    pub fn reset(&mut self) {
        self.sequence = 0;
    }
}
