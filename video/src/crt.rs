//! The CRT proper: a flywheel-synchronised raster generator. Hosts push
//! spans of sync, blank, colour burst and pixel data measured in their own
//! clock cycles; the CRT tracks the implied beam position and emits one
//! [`Scan`] per visible span to its [`ScanTarget`].

use crate::scan_target::{EndPoint, Modals, Scan, ScanTarget, TargetEvent};

/// The analogue constants of a particular machine's video circuit. These
/// differ subtly between machines, so they are explicit rather than baked
/// in; the defaults are the common observations.
#[derive(Clone, Copy, Debug)]
pub struct CrtConfig {
    pub cycles_per_line: i32,
    pub height_of_display: i32,
    /// Scanlines' worth of charge the sync capacitor must accumulate to
    /// trigger vertical retrace.
    pub sync_capacity_line_charge_threshold: i32,
    /// Horizontal retrace duration, in 64ths of a line.
    pub horizontal_retrace_sixty_fourths: i32,
    /// Vertical retrace duration, in scanlines.
    pub scanlines_vertical_retrace_time: i32,
    /// Colour subcarrier cycles per line, as a ratio; zero disables the
    /// subcarrier phase computation.
    pub colour_cycle_numerator: i32,
    pub colour_cycle_denominator: i32,
}

impl CrtConfig {
    #[must_use]
    pub fn new(cycles_per_line: i32, height_of_display: i32) -> Self {
        CrtConfig {
            cycles_per_line,
            height_of_display,
            sync_capacity_line_charge_threshold: 3,
            horizontal_retrace_sixty_fourths: 16,
            scanlines_vertical_retrace_time: 26,
            colour_cycle_numerator: 0,
            colour_cycle_denominator: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncEvent {
    None,
    StartHSync,
    EndHSync,
    StartVSync,
    EndVSync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpanType {
    Sync,
    Blank,
    ColourBurst,
    Level,
    Data,
}

pub struct Crt {
    target: Box<dyn ScanTarget>,

    cycles_per_line: i32,
    height_of_display: i32,
    sync_capacity_line_charge_threshold: i32,
    horizontal_retrace_time: i32,
    vertical_retrace_time: i32,
    colour_cycle_numerator: i32,
    colour_cycle_denominator: i32,

    // Horizontal flywheel.
    hsync_error_window: i32,
    expected_next_hsync: i32,
    horizontal_counter: i32,
    did_detect_hsync: bool,
    is_receiving_sync: bool,
    is_in_hsync: bool,
    hsync_counter: i32,

    // Vertical sync capacitor and retrace.
    sync_capacitor_charge_level: i32,
    vretrace_counter: i32,

    // Beam position, as pure 16-bit fractions of the scanned rectangle.
    horizontal_offset: i32,
    vertical_offset: i32,

    // Sample staging for data spans.
    staging: Vec<u8>,
    staging_requested: usize,

    composite_amplitude: u8,
}

impl Crt {
    #[must_use]
    pub fn new(config: CrtConfig, target: Box<dyn ScanTarget>) -> Self {
        debug_assert!(config.cycles_per_line > 0 && config.height_of_display > 0);
        Crt {
            target,
            cycles_per_line: config.cycles_per_line,
            height_of_display: config.height_of_display,
            sync_capacity_line_charge_threshold: config.sync_capacity_line_charge_threshold,
            horizontal_retrace_time: (config.horizontal_retrace_sixty_fourths
                * config.cycles_per_line)
                >> 6,
            vertical_retrace_time: config.scanlines_vertical_retrace_time
                * config.cycles_per_line,
            colour_cycle_numerator: config.colour_cycle_numerator,
            colour_cycle_denominator: config.colour_cycle_denominator.max(1),
            hsync_error_window: config.cycles_per_line >> 5,
            expected_next_hsync: config.cycles_per_line,
            horizontal_counter: 0,
            did_detect_hsync: false,
            is_receiving_sync: false,
            is_in_hsync: false,
            hsync_counter: 0,
            sync_capacitor_charge_level: 0,
            vretrace_counter: 0,
            horizontal_offset: 0,
            vertical_offset: 0,
            staging: Vec::new(),
            staging_requested: 0,
            composite_amplitude: 0,
        }
    }

    pub fn set_modals(&mut self, modals: Modals) {
        self.target.set_modals(modals);
    }

    pub fn scan_target_mut(&mut self) -> &mut dyn ScanTarget {
        self.target.as_mut()
    }

    /// Picks the earliest of: recognising an incoming hsync, ending an
    /// ongoing hsync, the flywheel retriggering, vsync charge crossing its
    /// threshold, vertical retrace completing, or simply running out of
    /// cycles.
    fn advance_to_next_sync_event(
        &mut self,
        hsync_requested: bool,
        vsync_charging: bool,
        cycles_to_run_for: i32,
    ) -> (SyncEvent, i32) {
        // An edge inside the error window retimes the flywheel toward it.
        if hsync_requested
            && (self.horizontal_counter < self.hsync_error_window
                || self.horizontal_counter >= self.expected_next_hsync - self.hsync_error_window)
        {
            self.did_detect_hsync = true;
            let time_now = if self.horizontal_counter < self.hsync_error_window {
                self.expected_next_hsync + self.horizontal_counter
            } else {
                self.horizontal_counter
            };
            self.expected_next_hsync = (self.expected_next_hsync + time_now) >> 1;
        }

        let mut proposed_event = SyncEvent::None;
        let mut proposed_sync_time = cycles_to_run_for;

        // Too many lines without a vertical sync: force retrigger rather
        // than letting the frame run away.
        if self.hsync_counter > self.height_of_display + 10 {
            log::debug!("forcing horizontal retrigger after a field without vertical sync");
            self.hsync_counter = 0;
            return (SyncEvent::StartHSync, 0);
        }

        // The end of an ongoing horizontal retrace.
        if self.horizontal_counter < self.horizontal_retrace_time
            && self.horizontal_counter + proposed_sync_time >= self.horizontal_retrace_time
        {
            proposed_sync_time = self.horizontal_retrace_time - self.horizontal_counter;
            proposed_event = SyncEvent::EndHSync;
        }

        // The start of the next horizontal retrace, from the flywheel.
        if self.horizontal_counter + proposed_sync_time >= self.expected_next_hsync {
            proposed_sync_time = self.expected_next_hsync - self.horizontal_counter;
            proposed_event = SyncEvent::StartHSync;
        }

        // The sync capacitor crossing the vertical trigger threshold.
        if vsync_charging && self.vretrace_counter == 0 {
            let start_of_vsync_time =
                self.sync_capacity_line_charge_threshold * self.cycles_per_line;
            if self.sync_capacitor_charge_level < start_of_vsync_time
                && self.sync_capacitor_charge_level + proposed_sync_time >= start_of_vsync_time
            {
                proposed_sync_time = start_of_vsync_time - self.sync_capacitor_charge_level;
                proposed_event = SyncEvent::StartVSync;
            }
        }

        // The end of an ongoing vertical retrace.
        if self.vretrace_counter > 0 && self.vretrace_counter < proposed_sync_time {
            proposed_sync_time = self.vretrace_counter;
            proposed_event = SyncEvent::EndVSync;
        }

        (proposed_event, proposed_sync_time)
    }

    fn advance_raster(&mut self, cycles: i32) {
        if self.vretrace_counter > 0 {
            self.vertical_offset = (self.vertical_offset
                - (cycles * 65_536) / self.vertical_retrace_time)
                .max(0);
        } else {
            self.vertical_offset = (self.vertical_offset
                + (cycles * 65_536) / (self.height_of_display * self.cycles_per_line))
                .min(65_535);
        }

        if self.is_in_hsync {
            self.horizontal_offset = (self.horizontal_offset
                - (cycles * 65_536) / self.horizontal_retrace_time.max(1))
                .max(0);
        } else {
            self.horizontal_offset =
                (self.horizontal_offset + (cycles * 65_536) / self.cycles_per_line).min(65_535);
        }
    }

    fn composite_angle(&self) -> i16 {
        if self.colour_cycle_numerator == 0 {
            return 0;
        }
        // Degrees in 64ths: position within the line times cycles per
        // line, wrapped to a single subcarrier rotation.
        let angle = (i64::from(self.horizontal_counter)
            * i64::from(self.colour_cycle_numerator)
            * 360
            * 64)
            / (i64::from(self.colour_cycle_denominator) * i64::from(self.cycles_per_line));
        (angle % 23_040) as i16
    }

    fn end_point(&self, data_offset: u16) -> EndPoint {
        EndPoint {
            x: self.horizontal_offset.clamp(0, 65_535) as u16,
            y: self.vertical_offset.clamp(0, 65_535) as u16,
            data_offset,
            composite_angle: self.composite_angle(),
        }
    }

    fn advance_cycles(
        &mut self,
        number_of_cycles: i32,
        mut hsync_requested: bool,
        vsync_charging: bool,
        span: SpanType,
        total_samples: usize,
    ) {
        let total_cycles = number_of_cycles;
        let mut remaining = number_of_cycles;
        let mut consumed = 0;

        while remaining > 0 {
            // Hsync requests are edge-triggered; only the first pass sees
            // one.
            let (event, run_length) =
                self.advance_to_next_sync_event(hsync_requested, vsync_charging, remaining);
            hsync_requested = false;

            if run_length > 0 {
                let emit_scan = matches!(span, SpanType::Level | SpanType::Data);
                let offset_at = |cycles: i32| -> u16 {
                    if span == SpanType::Data && total_cycles > 0 {
                        ((cycles as i64 * total_samples as i64) / total_cycles as i64) as u16
                    } else {
                        0
                    }
                };

                let start = self.end_point(offset_at(consumed));
                self.advance_raster(run_length);

                if emit_scan {
                    let end = self.end_point(offset_at(consumed + run_length));
                    self.target.post_scan(Scan {
                        end_points: [start, end],
                        composite_amplitude: self.composite_amplitude,
                    });
                }
            }

            self.horizontal_counter += run_length;
            if vsync_charging {
                self.sync_capacitor_charge_level += run_length;
            } else {
                self.sync_capacitor_charge_level =
                    (self.sync_capacitor_charge_level - run_length).max(0);
            }
            self.vretrace_counter = (self.vretrace_counter - run_length).max(0);

            remaining -= run_length;
            consumed += run_length;

            match event {
                SyncEvent::StartHSync => {
                    self.horizontal_counter = 0;
                    self.is_in_hsync = true;
                    self.hsync_counter += 1;
                    self.target.announce(TargetEvent::HorizontalRetrace);
                }

                SyncEvent::EndHSync => {
                    // Without a detected edge, ease the expectation back
                    // toward the nominal line length.
                    if !self.did_detect_hsync {
                        self.expected_next_hsync = (self.expected_next_hsync
                            + (self.hsync_error_window >> 1)
                            + self.cycles_per_line)
                            >> 1;
                    }
                    self.did_detect_hsync = false;
                    self.is_in_hsync = false;
                    self.horizontal_offset = 0;
                }

                SyncEvent::StartVSync => {
                    self.vretrace_counter = self.vertical_retrace_time;
                    self.hsync_counter = 0;
                    self.composite_amplitude = 0;
                    self.target.announce(TargetEvent::VerticalRetrace);
                }

                SyncEvent::EndVSync => {
                    self.vertical_offset = 0;
                    self.target.submit();
                }

                SyncEvent::None => {}
            }
        }
    }

    /// The incoming signal is at sync level for `cycles`.
    pub fn output_sync(&mut self, cycles: i32) {
        // Edge-triggered: two successive sync spans are one edge.
        let hsync_requested = !self.is_receiving_sync;
        self.is_receiving_sync = true;
        self.advance_cycles(cycles, hsync_requested, true, SpanType::Sync, 0);
    }

    /// The incoming signal is blank (black, no sync) for `cycles`.
    pub fn output_blank(&mut self, cycles: i32) {
        self.is_receiving_sync = false;
        self.advance_cycles(cycles, false, false, SpanType::Blank, 0);
    }

    /// A colour burst of the given amplitude; affects the composite
    /// amplitude attached to subsequent scans.
    pub fn output_colour_burst(&mut self, cycles: i32, amplitude: u8) {
        self.is_receiving_sync = false;
        self.composite_amplitude = amplitude;
        self.advance_cycles(cycles, false, false, SpanType::ColourBurst, 0);
    }

    /// A constant level for `cycles`, described by one already-written
    /// sample.
    pub fn output_level(&mut self, cycles: i32) {
        self.is_receiving_sync = false;
        self.advance_cycles(cycles, false, false, SpanType::Level, 0);
    }

    /// A one-sample convenience for [`output_level`](Crt::output_level).
    pub fn output_level_sample(&mut self, cycles: i32, sample: &[u8]) {
        if let Some(area) = self.target.allocate_write_area(sample.len()) {
            area[..sample.len()].copy_from_slice(sample);
        }
        self.target.reduce_previous_allocation_to(sample.len());
        self.output_level(cycles);
    }

    /// Requests staging space for up to `required_samples` bytes of pixel
    /// data; pair with [`output_data`](Crt::output_data).
    pub fn begin_data(&mut self, required_samples: usize) -> &mut [u8] {
        self.staging_requested = required_samples;
        if self.staging.len() < required_samples {
            self.staging.resize(required_samples, 0);
        }
        &mut self.staging[..required_samples]
    }

    /// Emits `samples_written` staged samples spread over `cycles`.
    pub fn output_data(&mut self, cycles: i32, samples_written: usize) {
        self.is_receiving_sync = false;

        let samples_written = samples_written.min(self.staging_requested);
        let mut delivered = 0;
        if let Some(area) = self.target.allocate_write_area(self.staging_requested) {
            delivered = samples_written.min(area.len());
            area[..delivered].copy_from_slice(&self.staging[..delivered]);
        }
        self.target.reduce_previous_allocation_to(delivered);
        self.staging_requested = 0;

        self.advance_cycles(cycles, false, false, SpanType::Data, delivered);
    }
}
