mod common;

mod tests {
    use core::cell::RefCell;
    use std::time::Instant as StdInstant;

    use myrtio_led_driver::color::{BLACK, WHITE};
    use myrtio_led_driver::limiter::MIN_DITHER_FPS;
    use myrtio_led_driver::power::{estimate_power_mw, max_brightness_for_budget};
    use myrtio_led_driver::{
        ColorCorrection, DitherMode, DriverChain, Duration, Error, OutputConfig, PixelOutput,
        PowerModel, Rgb, StripSettings,
    };

    use crate::common::RecordingController;

    #[test]
    fn test_show_color_scales_by_brightness() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([BLACK; 10]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();
        let report = output.show_color(WHITE, 128);

        assert!(report.is_clean());
        assert_eq!(frames.borrow().last().unwrap(), &vec![[128, 128, 128]; 10]);
        // The buffer is untouched.
        assert!(leds.borrow().iter().all(|&led| led == BLACK));
    }

    #[test]
    fn test_show_reads_buffer_changes() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([BLACK; 3]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();

        leds.borrow_mut()[1] = Rgb::new(10, 20, 30);
        output.show();
        leds.borrow_mut()[2] = Rgb::new(40, 50, 60);
        output.show();

        let frames = frames.borrow();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![[0, 0, 0], [10, 20, 30], [0, 0, 0]]);
        assert_eq!(frames[1], vec![[0, 0, 0], [10, 20, 30], [40, 50, 60]]);
    }

    #[test]
    fn test_strips_share_a_buffer() {
        let mut first = RecordingController::new();
        let mut second = RecordingController::new();
        let (first_frames, second_frames) = (first.frames.clone(), second.frames.clone());
        let leds = RefCell::new([Rgb::new(1, 1, 1), Rgb::new(2, 2, 2), Rgb::new(3, 3, 3)]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach_range(&mut first, &leds, 0, 1).unwrap();
        output.attach_range(&mut second, &leds, 1, 2).unwrap();
        assert_eq!(output.count(), 2);
        assert_eq!(output.size(), 1);
        assert_eq!(output.get(1).map(|node| node.offset()), Some(1));

        output.show();
        assert_eq!(first_frames.borrow()[0], vec![[1, 1, 1]]);
        assert_eq!(second_frames.borrow()[0], vec![[2, 2, 2], [3, 3, 3]]);
    }

    #[test]
    fn test_attach_initializes_controller() {
        let mut strip = RecordingController::new();
        let leds = RefCell::new([BLACK; 4]);
        {
            let mut output: PixelOutput<'_> = PixelOutput::default();
            output.attach(&mut strip, &leds).unwrap();
        }
        assert_eq!(strip.inits, 1);
    }

    #[test]
    fn test_attach_errors() {
        let (mut a, mut b, mut c, mut d) = (
            RecordingController::new(),
            RecordingController::new(),
            RecordingController::new(),
            RecordingController::new(),
        );
        let mut extra = RecordingController::new();
        let leds = RefCell::new([BLACK; 10]);
        let empty = RefCell::new([BLACK; 0]);

        let mut output: PixelOutput<'_, 2> = PixelOutput::default();
        assert_eq!(output.attach(&mut a, &empty).err(), Some(Error::EmptyStrip));
        assert_eq!(
            output.attach_range(&mut b, &leds, 8, 5).err(),
            Some(Error::RangeOutOfBounds)
        );
        output.attach_range(&mut c, &leds, 0, 5).unwrap();
        output.attach_range(&mut d, &leds, 5, 5).unwrap();

        assert_eq!(
            output.attach(&mut extra, &leds).err(),
            Some(Error::CapacityExceeded)
        );
        assert_eq!(output.count(), 2);
    }

    #[test]
    fn test_attach_busy_buffer() {
        let mut strip = RecordingController::new();
        let leds = RefCell::new([BLACK; 4]);
        let _writer = leds.borrow_mut();

        let mut output: PixelOutput<'_> = PixelOutput::default();
        assert_eq!(output.attach(&mut strip, &leds).err(), Some(Error::BufferBusy));
    }

    #[test]
    fn test_lookup_and_detach_keep_order() {
        let (mut a, mut b, mut c) = (
            RecordingController::new(),
            RecordingController::new(),
            RecordingController::new(),
        );
        let (la, lb, lc) = (
            RefCell::new([BLACK; 3]),
            RefCell::new([BLACK; 4]),
            RefCell::new([BLACK; 5]),
        );

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut a, &la).unwrap();
        let middle = output.attach(&mut b, &lb).unwrap();
        output.attach(&mut c, &lc).unwrap();

        assert_eq!(output.at(2).map(|node| node.len()), Some(5));
        assert_eq!(output.at(7).map(|node| node.len()), Some(3));
        assert!(output.get(7).is_none());

        output.detach(middle).unwrap();
        assert_eq!(output.count(), 2);
        assert_eq!(output.get(1).map(|node| node.len()), Some(5));
        assert_eq!(output.detach(middle), Err(Error::UnknownStrip));
    }

    #[test]
    fn test_empty_output() {
        let mut output: PixelOutput<'_> = PixelOutput::default();
        assert_eq!(output.count(), 0);
        assert_eq!(output.size(), 0);
        assert!(output.at(0).is_none());
        assert!(output.show().is_clean());
    }

    #[test]
    fn test_refresh_rate_is_constrained_by_strips() {
        let mut slow = RecordingController::with_refresh(100);
        let mut fast = RecordingController::with_refresh(400);
        let mut slowest = RecordingController::with_refresh(25);
        let leds = RefCell::new([BLACK; 3]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach_range(&mut slow, &leds, 0, 1).unwrap();
        assert_eq!(output.limiter().min_interval(), Duration::from_millis(10));
        output.attach_range(&mut fast, &leds, 1, 1).unwrap();
        assert_eq!(output.limiter().min_interval(), Duration::from_millis(10));

        output.set_max_refresh_rate(50, false);
        assert_eq!(output.limiter().min_interval(), Duration::from_millis(20));
        output.attach_range(&mut slowest, &leds, 2, 1).unwrap();
        assert_eq!(output.limiter().min_interval(), Duration::from_millis(20));

        output.set_max_refresh_rate(200, true);
        assert_eq!(output.limiter().min_interval(), Duration::from_millis(20));
        assert_eq!(output.chain().min_refresh_rate(), 25);
    }

    #[test]
    fn test_show_respects_refresh_rate() {
        let mut strip = RecordingController::with_refresh(50);
        let leds = RefCell::new([BLACK; 1]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();

        let started = StdInstant::now();
        output.show();
        output.show();
        assert!(started.elapsed() >= std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_show_for_keeps_refreshing() {
        let mut strip = RecordingController::with_refresh(100);
        let frames = strip.frames.clone();
        let leds = RefCell::new([WHITE; 2]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();
        output.show_for(Duration::from_millis(30));

        assert!(frames.borrow().len() >= 3);
    }

    #[test]
    fn test_power_limit_lowers_brightness() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([WHITE; 10]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();
        assert_eq!(output.estimate_power_mw(), Ok(2265));
        assert_eq!(output.max_brightness_for_power(255), Ok(255));

        output.set_max_power_milliwatts(1000);
        assert_eq!(output.max_brightness_for_power(255), Ok(113));

        let report = output.show();
        assert_eq!(report.brightness, 113);
        assert!(output.power().is_limiting());
        assert_eq!(frames.borrow()[0], vec![[113, 113, 113]; 10]);

        output.set_max_power_volts_milliamps(5, 500);
        assert_eq!(output.show().brightness, 255);
        assert!(!output.power().is_limiting());

        output.clear_max_power();
        assert!(output.power().limit().is_none());
        assert_eq!(output.brightness(), 255);
    }

    #[test]
    fn test_clear() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([WHITE; 4]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();

        output.clear_data().unwrap();
        assert!(frames.borrow().is_empty());
        assert!(leds.borrow().iter().all(|&led| led == BLACK));

        leds.borrow_mut().fill(WHITE);
        output.clear(true).unwrap();
        assert_eq!(frames.borrow()[0], vec![[0, 0, 0]; 4]);
        assert!(leds.borrow().iter().all(|&led| led == BLACK));
    }

    #[test]
    fn test_busy_buffer_is_reported() {
        let mut strip = RecordingController::new();
        let leds = RefCell::new([WHITE; 4]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut strip, &leds).unwrap();

        let writer = leds.borrow_mut();
        let report = output.show();
        assert_eq!(report.failed, 1);
        assert_eq!(report.error, Some(Error::BufferBusy));
        assert!(!report.is_clean());
        assert_eq!(output.clear_data(), Err(Error::BufferBusy));
        assert_eq!(output.clear(true), Err(Error::BufferBusy));
        drop(writer);
        assert!(output.show().is_clean());
    }

    #[test]
    fn test_busy_strip_does_not_block_the_others() {
        let (mut a, mut b, mut c) = (
            RecordingController::new(),
            RecordingController::new(),
            RecordingController::new(),
        );
        let (a_frames, b_frames, c_frames) =
            (a.frames.clone(), b.frames.clone(), c.frames.clone());
        let (la, lb, lc) = (
            RefCell::new([WHITE; 3]),
            RefCell::new([WHITE; 4]),
            RefCell::new([WHITE; 5]),
        );

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach(&mut a, &la).unwrap();
        output.attach(&mut b, &lb).unwrap();
        output.attach(&mut c, &lc).unwrap();

        let writer = lb.borrow_mut();
        let report = output.show();
        assert_eq!(report.failed, 1);
        assert_eq!(report.error, Some(Error::BufferBusy));
        assert_eq!(a_frames.borrow().len(), 1);
        assert_eq!(b_frames.borrow().len(), 0);
        assert_eq!(c_frames.borrow().len(), 1);

        // The power budget is computed over the strips that can be shown.
        output.set_max_power_milliwatts(1000);
        let readable_mw = estimate_power_mw(&[WHITE; 3]) + estimate_power_mw(&[WHITE; 5]) + 125;
        let expected = max_brightness_for_budget(readable_mw, 255, 1000);
        let report = output.show();
        assert_eq!(report.brightness, expected);
        assert_eq!(report.failed, 1);
        assert_eq!(a_frames.borrow()[1], vec![[expected; 3]; 3]);
        assert_eq!(c_frames.borrow()[1], vec![[expected; 3]; 5]);
        assert_eq!(output.estimate_power_mw(), Err(Error::BufferBusy));

        drop(writer);
        assert!(output.show().is_clean());
        assert_eq!(b_frames.borrow().len(), 1);
    }

    #[test]
    fn test_power_estimate_counts_controller_once() {
        let mut first = RecordingController::new();
        let mut second = RecordingController::new();
        let (la, lb) = (RefCell::new([WHITE; 5]), RefCell::new([WHITE; 5]));
        let model = PowerModel {
            mcu_mw: 1000,
            ..PowerModel::default()
        };

        let config = OutputConfig {
            power_model: model,
            ..OutputConfig::default()
        };
        let mut output: PixelOutput<'_> = PixelOutput::new(config);
        output.attach(&mut first, &la).unwrap();
        output.attach(&mut second, &lb).unwrap();

        assert_eq!(
            output.estimate_power_mw(),
            Ok(model.estimate_mw(&[WHITE; 5]) * 2 + 1000)
        );
    }

    fn first_bytes(frames: &[Vec<[u8; 3]>]) -> Vec<u8> {
        frames.iter().map(|frame| frame[0][0]).collect()
    }

    #[test]
    fn test_dithering_starts_once_frame_rate_is_high() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([Rgb::new(100, 100, 100); 1]);

        let config = OutputConfig {
            brightness: 64,
            ..OutputConfig::default()
        };
        let mut output: PixelOutput<'_> = PixelOutput::new(config);
        output.attach(&mut strip, &leds).unwrap();

        // One frame opens the measuring window, 25 more close it.
        for _ in 0..26 {
            output.show();
        }
        assert!(output.fps() >= MIN_DITHER_FPS);
        assert!(first_bytes(&frames.borrow()).iter().all(|&byte| byte == 25));

        for _ in 0..8 {
            output.show();
        }
        let dithered = first_bytes(&frames.borrow()[26..]);
        assert!(dithered.iter().all(|&byte| byte == 25 || byte == 26));
        assert!(dithered.contains(&26));
    }

    #[test]
    fn test_slow_output_is_not_dithered() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([Rgb::new(100, 100, 100); 1]);

        let config = OutputConfig {
            brightness: 64,
            ..OutputConfig::default()
        };
        let mut output: PixelOutput<'_> = PixelOutput::new(config);
        output.attach(&mut strip, &leds).unwrap();
        output.set_max_refresh_rate(80, false);

        for _ in 0..30 {
            output.show();
        }
        assert!(output.fps() > 0);
        assert!(output.fps() < MIN_DITHER_FPS);
        assert!(first_bytes(&frames.borrow()).iter().all(|&byte| byte == 25));
    }

    #[test]
    fn test_correction_applies_to_all_strips() {
        let mut first = RecordingController::new();
        let mut second = RecordingController::new();
        let (first_frames, second_frames) = (first.frames.clone(), second.frames.clone());
        let leds = RefCell::new([WHITE; 2]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach_range(&mut first, &leds, 0, 1).unwrap();
        output.set_correction(ColorCorrection::TypicalLedStrip);
        output.attach_range(&mut second, &leds, 1, 1).unwrap();

        output.show();
        assert_eq!(first_frames.borrow()[0], vec![[255, 176, 240]]);
        assert_eq!(second_frames.borrow()[0], vec![[255, 176, 240]]);
        assert_eq!(
            output.at(1).map(|node| node.correction()),
            Some(Rgb::new(255, 176, 240))
        );
    }

    #[test]
    fn test_per_strip_settings() {
        let mut first = RecordingController::new();
        let mut second = RecordingController::new();
        let (first_frames, second_frames) = (first.frames.clone(), second.frames.clone());
        let leds = RefCell::new([WHITE; 2]);

        let mut output: PixelOutput<'_> = PixelOutput::default();
        output.attach_range(&mut first, &leds, 0, 1).unwrap();
        let handle = output.attach_range(&mut second, &leds, 1, 1).unwrap();
        output.set_dither(DitherMode::Disabled);

        let node = output.node_mut(handle).unwrap();
        node.set_temperature(Rgb::new(255, 0, 255));
        assert_eq!(node.dither(), DitherMode::Disabled);

        output.show();
        assert_eq!(first_frames.borrow()[0], vec![[255, 255, 255]]);
        assert_eq!(second_frames.borrow()[0], vec![[255, 0, 255]]);
    }

    #[test]
    fn test_output_config() {
        let mut strip = RecordingController::new();
        let frames = strip.frames.clone();
        let leds = RefCell::new([WHITE; 1]);

        let config = OutputConfig {
            brightness: 64,
            strip: StripSettings {
                dither: DitherMode::Disabled,
                ..StripSettings::default()
            },
            ..OutputConfig::default()
        };
        let mut output: PixelOutput<'_> = PixelOutput::new(config);
        output.attach(&mut strip, &leds).unwrap();
        assert_eq!(output.show().brightness, 64);
        assert_eq!(frames.borrow()[0], vec![[64, 64, 64]]);

        output.set_brightness(0);
        output.show();
        assert_eq!(frames.borrow()[1], vec![[0, 0, 0]]);
    }

    #[test]
    fn test_driver_chain_direct() {
        let mut strip = RecordingController::with_refresh(0);
        let frames = strip.frames.clone();
        let leds = RefCell::new([Rgb::new(200, 100, 50); 2]);

        let mut chain: DriverChain<'_> = DriverChain::new();
        assert_eq!(chain.capacity(), 8);
        let settings = StripSettings {
            dither: DitherMode::Disabled,
            ..StripSettings::default()
        };
        let handle = chain.attach(&mut strip, &leds, settings).unwrap();
        assert_eq!(chain.min_refresh_rate(), 0);

        let node = chain.node_mut(handle).unwrap();
        assert_eq!(node.adjustment(255), WHITE);
        node.show_leds(255).unwrap();
        node.show_color(Rgb::new(9, 9, 9), 255).unwrap();
        assert_eq!(frames.borrow()[0], vec![[200, 100, 50]; 2]);
        assert_eq!(frames.borrow()[1], vec![[9, 9, 9]; 2]);

        let mut total = 0;
        chain.for_each(|node| total += node.len());
        assert_eq!(total, 2);
    }
}
