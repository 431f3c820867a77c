quantity!(Volts, "V", 0);
