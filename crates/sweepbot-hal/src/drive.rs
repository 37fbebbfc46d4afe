//! Generic `DriveActuator` trait for the drive-and-collect motor controller.
//!
//! The motor controller is a pure lookup: each [`DriveCommand`] selects one
//! line pattern, with no state of its own. Drivers implement
//! [`DriveActuator::command`]; the named helpers exist so call sites read
//! like the motion they request.

use sweepbot_types::{DriveCommand, RoverError};

/// The robot's drive base plus its collection mechanism.
///
/// Every command is assumed to take effect before the next poll tick.
pub trait DriveActuator: Send {
    /// Stable identifier for this driver, e.g. `"gpio_drive"`.
    fn id(&self) -> &str;

    /// Apply a single motor-controller command.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the command cannot be
    /// applied (e.g. the output lines are not available).
    fn command(&mut self, cmd: DriveCommand) -> Result<(), RoverError>;

    fn move_forward(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::MoveForward)
    }

    fn move_backward(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::MoveBackward)
    }

    fn turn_left(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::TurnLeft)
    }

    fn turn_right(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::TurnRight)
    }

    fn stop_moving(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::StopMoving)
    }

    fn stop_turning(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::StopTurning)
    }

    fn collect(&mut self) -> Result<(), RoverError> {
        self.command(DriveCommand::Collect)
    }
}
