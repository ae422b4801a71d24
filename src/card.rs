//! Badge screen layout
//!
//! ```text
//! +----------------------------------------+
//! |          status line or handle         |
//! |              display name              |
//! | +--------+   +-------+ or contribution |
//! | | avatar |   |  QR   |    graph and    |
//! | | 75x75  |   +-------+      stats      |
//! | +--------+   LinkedIn                  |
//! +----------------------------------------+
//! ```

use alloc::format;
use alloc::string::String;

use embedded_graphics::mono_font::ascii::{FONT_5X8, FONT_6X10, FONT_8X13_BOLD};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder};

use crate::app::Screen;
use crate::image::Image;
use crate::profile::{DAYS, WEEKS};
use crate::user::User;

const PHOSPHOR: Rgb888 = Rgb888::new(211, 250, 55);
const WHITE: Rgb888 = Rgb888::new(235, 245, 255);

/// Contribution level colors, empty to busiest
const LEVELS: [Rgb888; 5] = [
    Rgb888::new(10, 13, 17),
    Rgb888::new(1, 29, 11),
    Rgb888::new(12, 54, 23),
    Rgb888::new(23, 80, 33),
    Rgb888::new(43, 105, 50),
];

const CENTER_X: i32 = 80;
const AVATAR_POS: Point = Point::new(5, 37);
const SPINNER_CENTER: Point = Point::new(42, 75);
const QR_POS: Point = Point::new(85, 30);
const GRAPH_POS: Point = Point::new(85, 37);
/// Weeks of history that fit beside the avatar
const GRAPH_WEEKS: usize = 18;
const GRAPH_CELL: u32 = 3;
const GRAPH_PITCH: i32 = 4;

/// Glyphs shown while the name is unknown
const NOISE: &[u8] = b"!\"$%^&*()_+-={}[]:@~;'#<>?,./\\|";
const NOISE_LEN: usize = 20;

/// Points on the spinner orbit, clockwise from 12 o'clock
const ORBIT: [(i32, i32); 8] = [
    (0, -14),
    (10, -10),
    (14, 0),
    (10, 10),
    (0, 14),
    (-10, 10),
    (-14, 0),
    (-10, -10),
];

fn color(c: Rgb888) -> Rgb565 {
    Rgb565::from(c)
}

fn centered() -> TextStyle {
    TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build()
}

fn top_left() -> TextStyle {
    TextStyleBuilder::new().baseline(Baseline::Top).build()
}

/// Draw a whole frame
pub fn draw<D>(target: &mut D, screen: Screen, user: &User, ticks_ms: u64) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(Rgb565::BLACK)?;

    match screen {
        Screen::MissingDetails => draw_missing_details(target),
        Screen::ConnectionFailed => draw_connection_failed(target),
        Screen::Card(hint) => {
            let status = hint.caption().or(user.handle()).unwrap_or_default();
            draw_card(target, status, user, ticks_ms)
        }
    }
}

fn draw_card<D>(target: &mut D, status: &str, user: &User, ticks_ms: u64) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    if let Some(qr) = &user.qr {
        blit(target, qr, QR_POS)?;
        let label_y = QR_POS.y + qr.height() as i32 + 3;
        Text::with_text_style(
            "LinkedIn",
            Point::new(QR_POS.x + qr.width() as i32 / 2, label_y),
            MonoTextStyle::new(&FONT_5X8, color(WHITE)),
            centered(),
        )
        .draw(target)?;
    } else if user.contributions.is_some() || user.profile.is_some() {
        draw_stats(target, user)?;
    }

    Text::with_text_style(
        status,
        Point::new(CENTER_X, 2),
        MonoTextStyle::new(&FONT_6X10, color(WHITE)),
        centered(),
    )
    .draw(target)?;

    let noise;
    let name = match user.display_name() {
        Some(name) => name,
        None => {
            noise = placeholder(ticks_ms);
            noise.as_str()
        }
    };
    Text::with_text_style(
        name,
        Point::new(CENTER_X, 16),
        MonoTextStyle::new(&FONT_5X8, color(PHOSPHOR)),
        centered(),
    )
    .draw(target)?;

    match &user.avatar {
        Some(avatar) => blit(target, avatar, AVATAR_POS),
        None => draw_spinner(target, ticks_ms),
    }
}

/// Recent contribution weeks and profile counters
fn draw_stats<D>(target: &mut D, user: &User) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let mut y = GRAPH_POS.y;

    if let Some(contributions) = &user.contributions {
        for day in 0..DAYS {
            for (col, week) in (WEEKS - GRAPH_WEEKS..WEEKS).enumerate() {
                let level = contributions.levels[day][week] as usize;
                Rectangle::new(
                    GRAPH_POS + Point::new(col as i32 * GRAPH_PITCH, day as i32 * GRAPH_PITCH),
                    Size::new(GRAPH_CELL, GRAPH_CELL),
                )
                .into_styled(PrimitiveStyle::with_fill(color(LEVELS[level.min(4)])))
                .draw(target)?;
            }
        }
        y += DAYS as i32 * GRAPH_PITCH + 4;

        Text::with_text_style(
            &format!("{} contribs", contributions.total),
            Point::new(GRAPH_POS.x, y),
            MonoTextStyle::new(&FONT_5X8, color(WHITE)),
            top_left(),
        )
        .draw(target)?;
        y += 10;
    }

    if let Some(profile) = &user.profile {
        let stats = format!("{} followers\n{} repos", profile.followers, profile.repos);
        Text::with_text_style(
            &stats,
            Point::new(GRAPH_POS.x, y),
            MonoTextStyle::new(&FONT_5X8, color(WHITE)),
            top_left(),
        )
        .draw(target)?;
    }

    Ok(())
}

/// Copy an image to the target, blending its alpha over black
fn blit<D>(target: &mut D, image: &Image, origin: Point) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let pixels = (0..image.height()).flat_map(|y| {
        (0..image.width()).filter_map(move |x| {
            let [r, g, b, a] = image.pixel(x, y)?;
            let blend = |c: u8| (c as u16 * a as u16 / 255) as u8;
            Some(Pixel(
                origin + Point::new(x as i32, y as i32),
                color(Rgb888::new(blend(r), blend(g), blend(b))),
            ))
        })
    });
    target.draw_iter(pixels)
}

/// Four squares chasing each other around the avatar slot
fn draw_spinner<D>(target: &mut D, ticks_ms: u64) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let step = (ticks_ms / 100) as usize;
    for i in 0..4 {
        let (dx, dy) = ORBIT[(step + ORBIT.len() - i) % ORBIT.len()];
        let size = 6 - i as u32;
        let fade = 255 - i as u8 * 50;
        let shade = Rgb888::new(
            (PHOSPHOR.r() as u16 * fade as u16 / 255) as u8,
            (PHOSPHOR.g() as u16 * fade as u16 / 255) as u8,
            (PHOSPHOR.b() as u16 * fade as u16 / 255) as u8,
        );
        Rectangle::with_center(SPINNER_CENTER + Point::new(dx, dy), Size::new(size, size))
            .into_styled(PrimitiveStyle::with_fill(color(shade)))
            .draw(target)?;
    }
    Ok(())
}

/// Glyph noise standing in for the name, reshuffled every 100 ms
fn placeholder(ticks_ms: u64) -> String {
    let mut state = ticks_ms / 100;
    (0..NOISE_LEN)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            NOISE[(state >> 33) as usize % NOISE.len()] as char
        })
        .collect()
}

fn draw_missing_details<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    draw_title(target, "Missing Details!")?;
    draw_steps(
        target,
        30,
        &[
            (23, "Put your badge into\ndisk mode (tap\nRESET twice)"),
            (55, "Edit SECRETS.TXT to\nset WiFi details and\nGitHub username."),
            (87, "Reload to see your\nsweet sweet stats!"),
        ],
    )
}

fn draw_connection_failed<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    draw_title(target, "Connection Failed!")?;
    Text::with_text_style(
        "Could not connect\nto the WiFi network.\n\n:-(",
        Point::new(16, 20),
        MonoTextStyle::new(&FONT_5X8, color(PHOSPHOR)),
        top_left(),
    )
    .draw(target)?;
    draw_steps(
        target,
        30,
        &[
            (63, "Edit SECRETS.TXT to\nset WiFi details and\nGitHub username."),
            (95, "Reload to see your\nsweet sweet stats!"),
        ],
    )
}

fn draw_title<D>(target: &mut D, title: &str) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Text::with_text_style(
        title,
        Point::new(CENTER_X, 5),
        MonoTextStyle::new(&FONT_8X13_BOLD, color(WHITE)),
        centered(),
    )
    .draw(target)?;
    Ok(())
}

/// Numbered instructions, one block of text per step
fn draw_steps<D>(target: &mut D, text_x: i32, steps: &[(i32, &str)]) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    for (n, (y, text)) in steps.iter().enumerate() {
        Text::with_text_style(
            &format!("{}:", n + 1),
            Point::new(10, *y),
            MonoTextStyle::new(&FONT_8X13_BOLD, color(WHITE)),
            top_left(),
        )
        .draw(target)?;
        Text::with_text_style(
            text,
            Point::new(text_x, y + 1),
            MonoTextStyle::new(&FONT_5X8, color(PHOSPHOR)),
            top_left(),
        )
        .draw(target)?;
    }
    Ok(())
}
