use crossterm::event::KeyCode;

use crate::state::{Direction, Player, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
	Move(Direction),
	Select,
}

/// A fighter's keypress, reduced to what it asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
	pub player: Player,
	pub kind: IntentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
	SetScene(Scene),
	Reset,
	ResetCursors,
	ToggleDuplicates,
	ToggleControls,
	ToggleRandom,
	Randomize(Player),
	/// Declare the fighter `player` has picked as the winner.
	WinnerFrom(Player),
	ClearWinner,
	Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
	Fighter(Intent),
	Operator(OperatorCommand),
}

fn fighter(player: Player, kind: IntentKind) -> Option<KeyAction> {
	Some(KeyAction::Fighter(Intent { player, kind }))
}

fn operator(command: OperatorCommand) -> Option<KeyAction> {
	Some(KeyAction::Operator(command))
}

pub fn map_key(key: KeyCode) -> Option<KeyAction> {
	use Direction::*;
	use IntentKind::*;
	use Player::*;

	match key {
		KeyCode::Up => fighter(P1, Move(Up)),
		KeyCode::Down => fighter(P1, Move(Down)),
		KeyCode::Left => fighter(P1, Move(Left)),
		KeyCode::Right => fighter(P1, Move(Right)),
		KeyCode::Enter => fighter(P1, Select),
		KeyCode::Esc => operator(OperatorCommand::Quit),
		KeyCode::Char(c) => map_char(c.to_ascii_lowercase()),
		_ => None,
	}
}

fn map_char(c: char) -> Option<KeyAction> {
	use Direction::*;
	use IntentKind::*;
	use Player::*;

	match c {
		'w' => fighter(P1, Move(Up)),
		'a' => fighter(P1, Move(Left)),
		's' => fighter(P1, Move(Down)),
		'd' => fighter(P1, Move(Right)),
		'e' | ' ' => fighter(P1, Select),

		'i' => fighter(P2, Move(Up)),
		'j' => fighter(P2, Move(Left)),
		'k' => fighter(P2, Move(Down)),
		'l' => fighter(P2, Move(Right)),
		'o' => fighter(P2, Select),

		'1'..='6' => {
			let index = c as usize - '1' as usize;
			operator(OperatorCommand::SetScene(Scene::ALL[index]))
		}
		'z' => operator(OperatorCommand::Reset),
		'0' => operator(OperatorCommand::ResetCursors),
		'x' => operator(OperatorCommand::ToggleDuplicates),
		'c' => operator(OperatorCommand::ToggleControls),
		'r' => operator(OperatorCommand::ToggleRandom),
		'[' => operator(OperatorCommand::Randomize(P1)),
		']' => operator(OperatorCommand::Randomize(P2)),
		',' => operator(OperatorCommand::WinnerFrom(P1)),
		'.' => operator(OperatorCommand::WinnerFrom(P2)),
		'/' => operator(OperatorCommand::ClearWinner),
		'q' => operator(OperatorCommand::Quit),
		_ => None,
	}
}

/// One-line key reference for the control panel.
pub fn help_text() -> &'static str {
	"P1: WASD/arrows + E/Enter/Space | P2: IJKL + O | scenes 1-6 | z reset | 0 cursors | x dupes | c controls | r random on/off | [ ] random | , . winner | / clear | q quit"
}
